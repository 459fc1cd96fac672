//! Request-level tests against the full router

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::{Duration, Utc};
use tower::ServiceExt;

use super::*;
use crate::db::{create_test_pool, migrations};
use crate::models::{CategoryInput, CreateUserInput, LocationInput, User};
use crate::services::post::PUB_DATE_FORMAT;
use crate::services::{LoginInput, PostDraft};

const CSRF: &str = "0123456789abcdef0123456789abcdef";
const PASSWORD: &str = "Tr4vel-Notes-2024";

struct TestApp {
    router: Router,
    state: AppState,
}

impl TestApp {
    async fn new() -> Self {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let theme = ThemeEngine::embedded().expect("Failed to load theme");
        let state = build_state(Config::default(), pool, theme);
        Self {
            router: build_router(state.clone()),
            state,
        }
    }

    /// Register and sign in; returns the user and the session id
    async fn user(&self, username: &str) -> (User, String) {
        let user = self
            .state
            .user_service
            .register(CreateUserInput {
                username: username.to_string(),
                email: String::new(),
                password: PASSWORD.to_string(),
                password_confirm: PASSWORD.to_string(),
            })
            .await
            .unwrap();
        let (session, _) = self
            .state
            .user_service
            .login(LoginInput::new(username, PASSWORD))
            .await
            .unwrap();
        (user, session.id)
    }

    async fn category(&self, slug: &str) -> i64 {
        self.state
            .category_service
            .create(CategoryInput {
                title: slug.to_string(),
                description: "About it".to_string(),
                slug: slug.to_string(),
                is_published: true,
            })
            .await
            .unwrap()
            .id
    }

    async fn post(&self, author: &User, title: &str, category_id: i64, published: bool) -> i64 {
        let draft = PostDraft {
            title: title.to_string(),
            text: "Text of the post".to_string(),
            pub_date: (Utc::now() - Duration::hours(1)).format(PUB_DATE_FORMAT).to_string(),
            category_id: category_id.to_string(),
            location_id: String::new(),
            is_published: published,
        };
        self.state.post_service.create(author, &draft).await.unwrap().id
    }

    async fn get(&self, uri: &str, session: Option<&str>) -> Response {
        let request = Request::builder()
            .uri(uri)
            .header(header::COOKIE, cookies(session))
            .body(Body::empty())
            .unwrap();
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// POST a form carrying the matching CSRF field
    async fn post_form(&self, uri: &str, session: Option<&str>, body: &str) -> Response {
        let body = if body.is_empty() {
            format!("csrfmiddlewaretoken={}", CSRF)
        } else {
            format!("csrfmiddlewaretoken={}&{}", CSRF, body)
        };
        self.send_post(uri, &cookies(session), body).await
    }

    async fn send_post(&self, uri: &str, cookie: &str, body: String) -> Response {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::COOKIE, cookie)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();
        self.router.clone().oneshot(request).await.unwrap()
    }
}

fn cookies(session: Option<&str>) -> String {
    match session {
        Some(id) => format!("csrftoken={}; session={}", CSRF, id),
        None => format!("csrftoken={}", CSRF),
    }
}

fn location(response: &Response) -> &str {
    response.headers()[header::LOCATION].to_str().unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_index_lists_only_public_posts() {
    let app = TestApp::new().await;
    let (author, _) = app.user("alice").await;
    let travel = app.category("travel").await;
    app.post(&author, "Seen by all", travel, true).await;
    app.post(&author, "Still a draft", travel, false).await;

    let response = app.get("/", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("Seen by all"));
    assert!(!html.contains("Still a draft"));
}

#[tokio::test]
async fn test_unpublished_post_visible_to_author_only() {
    let app = TestApp::new().await;
    let (author, author_session) = app.user("alice").await;
    let (_, other_session) = app.user("bob").await;
    let travel = app.category("travel").await;
    let id = app.post(&author, "Hidden draft", travel, false).await;
    let uri = format!("/posts/{}/", id);

    assert_eq!(app.get(&uri, None).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.get(&uri, Some(&other_session)).await.status(), StatusCode::NOT_FOUND);

    let response = app.get(&uri, Some(&author_session)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Hidden draft"));
}

#[tokio::test]
async fn test_non_author_edit_redirects_to_detail() {
    let app = TestApp::new().await;
    let (author, _) = app.user("alice").await;
    let (_, other_session) = app.user("bob").await;
    let travel = app.category("travel").await;
    let id = app.post(&author, "Original", travel, true).await;
    let edit = format!("/posts/{}/edit/", id);

    let response = app.get(&edit, Some(&other_session)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("/posts/{}/", id));

    let response = app
        .post_form(&edit, Some(&other_session), "title=Hijacked&text=x&pub_date=2024-01-01T10:00")
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("/posts/{}/", id));

    let post = app.state.post_service.get(id).await.unwrap();
    assert_eq!(post.post.title, "Original");
}

#[tokio::test]
async fn test_create_post_redirects_to_profile() {
    let app = TestApp::new().await;
    let (_, session) = app.user("alice").await;
    let travel = app.category("travel").await;

    let body = format!(
        "title=First+trip&text=Went+north&pub_date=2024-01-01T10%3A00&category={}&location=&is_published=on",
        travel
    );
    let response = app.post_form("/posts/create/", Some(&session), &body).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/profile/alice/");

    let html = body_text(app.get("/", None).await).await;
    assert!(html.contains("First trip"));
}

#[tokio::test]
async fn test_invalid_post_form_is_redisplayed() {
    let app = TestApp::new().await;
    let (_, session) = app.user("alice").await;

    let response = app
        .post_form("/posts/create/", Some(&session), "title=&text=&pub_date=soon&category=")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("This field is required."));
}

#[tokio::test]
async fn test_anonymous_create_goes_to_login() {
    let app = TestApp::new().await;

    let response = app.get("/posts/create/", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/auth/login/?next=%2Fposts%2Fcreate%2F");

    let response = app.post_form("/posts/create/", None, "title=x").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/auth/login/?next=%2Fposts%2Fcreate%2F");
}

#[tokio::test]
async fn test_post_without_csrf_token_is_refused() {
    let app = TestApp::new().await;
    let (author, session) = app.user("alice").await;
    let travel = app.category("travel").await;
    let id = app.post(&author, "Keep me", travel, true).await;
    let uri = format!("/posts/{}/delete/", id);

    // no field
    let response = app.send_post(&uri, &cookies(Some(&session)), String::new()).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // field that does not match the cookie
    let response = app
        .send_post(
            &uri,
            &cookies(Some(&session)),
            "csrfmiddlewaretoken=ffffffffffffffffffffffffffffffff".to_string(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // no cookie at all
    let response = app
        .send_post(&uri, &format!("session={}", session), format!("csrfmiddlewaretoken={}", CSRF))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    assert!(app.state.post_service.get(id).await.is_ok());
}

#[tokio::test]
async fn test_first_visit_receives_csrf_cookie() {
    let app = TestApp::new().await;
    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();

    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("csrftoken="));
}

#[tokio::test]
async fn test_comment_flow() {
    let app = TestApp::new().await;
    let (author, author_session) = app.user("alice").await;
    let (_, other_session) = app.user("bob").await;
    let travel = app.category("travel").await;
    let id = app.post(&author, "Talk about it", travel, true).await;

    let response = app
        .post_form(&format!("/posts/{}/comment/", id), Some(&author_session), "text=Nice+view")
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("/posts/{}/", id));

    let comments = app.state.comment_service.list_for_post(id).await.unwrap();
    assert_eq!(comments.len(), 1);
    let comment_id = comments[0].comment.id;

    let edit = format!("/posts/{}/edit_comment/{}/", id, comment_id);
    assert_eq!(app.get(&edit, Some(&other_session)).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        app.post_form(&edit, Some(&other_session), "text=Spam").await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(app.get(&edit, Some(&author_session)).await.status(), StatusCode::OK);

    let html = body_text(app.get(&format!("/posts/{}/", id), None).await).await;
    assert!(html.contains("Nice view"));
}

#[tokio::test]
async fn test_admin_is_staff_only() {
    let app = TestApp::new().await;
    let (first, admin_session) = app.user("admin").await;
    let (second, author_session) = app.user("alice").await;
    assert!(first.is_staff());
    assert!(!second.is_staff());

    assert_eq!(app.get("/admin/", Some(&admin_session)).await.status(), StatusCode::OK);
    assert_eq!(app.get("/admin/posts/", Some(&admin_session)).await.status(), StatusCode::OK);
    assert_eq!(app.get("/admin/", Some(&author_session)).await.status(), StatusCode::FORBIDDEN);

    let response = app.get("/admin/posts/", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/auth/login/?next=%2Fadmin%2Fposts%2F");
}

#[tokio::test]
async fn test_bad_page_numbers_are_not_found() {
    let app = TestApp::new().await;
    assert_eq!(app.get("/?page=abc", None).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.get("/?page=0", None).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.get("/?page=", None).await.status(), StatusCode::OK);
    assert_eq!(app.get("/?page=1", None).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_routes_are_not_found() {
    let app = TestApp::new().await;
    let response = app.get("/no/such/page/", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_text(response).await.contains("<html"));

    assert_eq!(app.get("/posts/abc/", None).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.get("/category/nowhere/", None).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.get("/profile/nobody/", None).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_static_pages_and_assets() {
    let app = TestApp::new().await;
    assert_eq!(app.get("/pages/about/", None).await.status(), StatusCode::OK);
    assert_eq!(app.get("/pages/rules/", None).await.status(), StatusCode::OK);

    let response = app.get("/static/css/style.css", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/css");

    assert_eq!(app.get("/static/css/none.css", None).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_login_and_logout() {
    let app = TestApp::new().await;
    app.user("alice").await;

    let body = format!("username=alice&password={}&next=%2Fpages%2Fabout%2F", PASSWORD);
    let response = app.post_form("/auth/login/", None, &body).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/pages/about/");
    let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
    assert!(set_cookie.starts_with("session="));
    let session = set_cookie
        .trim_start_matches("session=")
        .split(';')
        .next()
        .unwrap()
        .to_string();

    let html = body_text(app.get("/", Some(&session)).await).await;
    assert!(html.contains("/profile/alice/"));

    let response = app.post_form("/auth/logout/", Some(&session), "").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::SET_COOKIE].to_str().unwrap().contains("Max-Age=0"));

    let response = app.get("/posts/create/", Some(&session)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_wrong_password_redisplays_login() {
    let app = TestApp::new().await;
    app.user("alice").await;

    let response = app
        .post_form("/auth/login/", None, "username=alice&password=wrong")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn test_registration_then_profile() {
    let app = TestApp::new().await;
    let body = format!(
        "username=carol&email=carol%40example.com&password1={p}&password2={p}",
        p = PASSWORD
    );
    let response = app.post_form("/auth/registration/", None, &body).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/auth/login/");

    assert_eq!(app.get("/profile/carol/", None).await.status(), StatusCode::OK);

    let response = app
        .post_form("/auth/registration/", None, "username=carol&password1=a&password2=b")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("A user with that username already exists."));
}

fn pub_date() -> String {
    (Utc::now() - Duration::hours(1)).format(PUB_DATE_FORMAT).to_string()
}

#[tokio::test]
async fn test_non_author_cannot_delete_post() {
    let app = TestApp::new().await;
    let (author, _) = app.user("alice").await;
    let (_, other_session) = app.user("bob").await;
    let travel = app.category("travel").await;
    let id = app.post(&author, "Mine", travel, true).await;
    let uri = format!("/posts/{}/delete/", id);

    assert_eq!(app.get(&uri, Some(&other_session)).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.post_form(&uri, Some(&other_session), "").await.status(), StatusCode::NOT_FOUND);
    assert!(app.state.post_service.get(id).await.is_ok());
}

#[tokio::test]
async fn test_non_author_cannot_delete_comment() {
    let app = TestApp::new().await;
    let (author, _) = app.user("alice").await;
    let (_, other_session) = app.user("bob").await;
    let travel = app.category("travel").await;
    let id = app.post(&author, "Talk about it", travel, true).await;
    let comment = app.state.comment_service.create(id, &author, "First!").await.unwrap();
    let uri = format!("/posts/{}/delete_comment/{}/", id, comment.id);

    assert_eq!(app.get(&uri, Some(&other_session)).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.post_form(&uri, Some(&other_session), "").await.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.state.comment_service.list_for_post(id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_admin_list_saves_every_row() {
    let app = TestApp::new().await;
    let (admin, session) = app.user("admin").await;
    let travel = app.category("travel").await;
    let food = app.category("food").await;
    let a = app.post(&admin, "Alpha", travel, true).await;
    let b = app.post(&admin, "Beta", travel, false).await;

    let body = format!(
        "post_id={a}&category_{a}={food}&post_id={b}&category_{b}=&is_published_{b}=on",
        a = a,
        b = b,
        food = food
    );
    let response = app.post_form("/admin/posts/", Some(&session), &body).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/admin/posts/");

    let alpha = app.state.post_service.get(a).await.unwrap().post;
    assert!(!alpha.is_published);
    assert_eq!(alpha.category_id, Some(food));
    let beta = app.state.post_service.get(b).await.unwrap().post;
    assert!(beta.is_published);
    assert_eq!(beta.category_id, None);
}

#[tokio::test]
async fn test_admin_list_with_a_bad_row_saves_nothing() {
    let app = TestApp::new().await;
    let (admin, session) = app.user("admin").await;
    let travel = app.category("travel").await;
    let a = app.post(&admin, "Alpha", travel, true).await;
    let b = app.post(&admin, "Beta", travel, true).await;

    let body = format!(
        "post_id={a}&category_{a}=&post_id={b}&category_{b}=9999&is_published_{b}=on",
        a = a,
        b = b
    );
    let response = app.post_form("/admin/posts/", Some(&session), &body).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Select a valid choice."));

    for id in [a, b] {
        let post = app.state.post_service.get(id).await.unwrap().post;
        assert!(post.is_published);
        assert_eq!(post.category_id, Some(travel));
    }
}

#[tokio::test]
async fn test_admin_list_redirect_stays_in_range() {
    let app = TestApp::new().await;
    let (admin, session) = app.user("admin").await;
    let travel = app.category("travel").await;
    let food = app.category("food").await;
    let per_page = app.state.post_service.per_page() as usize;
    let mut ids = Vec::new();
    for n in 0..=per_page {
        ids.push(app.post(&admin, &format!("Trip {}", n), travel, true).await);
    }
    let filter = format!("/admin/posts/?category={}&page=2", travel);
    assert_eq!(app.get(&filter, Some(&session)).await.status(), StatusCode::OK);

    // moving one post out of the filter leaves a single page
    let body = format!(
        "category={travel}&page=2&post_id={id}&category_{id}={food}&is_published_{id}=on",
        travel = travel,
        id = ids[0],
        food = food
    );
    let response = app.post_form("/admin/posts/", Some(&session), &body).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("/admin/posts/?category={}", travel));
    assert_eq!(app.get(location(&response), Some(&session)).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_admin_category_change_adds_inline_post() {
    let app = TestApp::new().await;
    let (admin, session) = app.user("admin").await;
    let travel = app.category("travel").await;

    let body = format!(
        "title=Trips&description=Far+away&slug=travel&is_published=on\
         &post-title=From+the+road&post-text=Day+one&post-pub_date={}&post-location=&post-is_published=on",
        pub_date()
    );
    let response = app
        .post_form(&format!("/admin/categories/{}/", travel), Some(&session), &body)
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/admin/categories/");

    assert_eq!(app.state.category_service.get_by_id(travel).await.unwrap().title, "Trips");
    let posts = app.state.post_service.all_in_category(travel).await.unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].post.title, "From the road");
    assert_eq!(posts[0].post.author_id, admin.id);
}

#[tokio::test]
async fn test_admin_category_change_with_bad_inline_row_saves_nothing() {
    let app = TestApp::new().await;
    let (_, session) = app.user("admin").await;
    let travel = app.category("travel").await;

    let body = format!(
        "title=Trips&description=Far+away&slug=travel&is_published=on\
         &post-title=From+the+road&post-text=&post-pub_date={}",
        pub_date()
    );
    let response = app
        .post_form(&format!("/admin/categories/{}/", travel), Some(&session), &body)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("This field is required."));

    assert_eq!(app.state.category_service.get_by_id(travel).await.unwrap().title, "travel");
    assert!(app.state.post_service.all_in_category(travel).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_admin_location_change_inline_row() {
    let app = TestApp::new().await;
    let (_, session) = app.user("admin").await;
    let travel = app.category("travel").await;
    let moscow = app
        .state
        .location_service
        .create(LocationInput { name: "Moscow".to_string(), is_published: true })
        .await
        .unwrap()
        .id;
    let uri = format!("/admin/locations/{}/", moscow);

    let rejected = format!(
        "name=Kazan&is_published=on&post-title=Lost&post-text=Somewhere&post-pub_date={}&post-category=9999",
        pub_date()
    );
    let response = app.post_form(&uri, Some(&session), &rejected).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.state.location_service.get_by_id(moscow).await.unwrap().name, "Moscow");
    assert!(app.state.post_service.all_at_location(moscow).await.unwrap().is_empty());

    let accepted = format!(
        "name=Kazan&is_published=on&post-title=Found&post-text=Here&post-pub_date={}&post-category={}",
        pub_date(),
        travel
    );
    let response = app.post_form(&uri, Some(&session), &accepted).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/admin/locations/");
    assert_eq!(app.state.location_service.get_by_id(moscow).await.unwrap().name, "Kazan");
    let posts = app.state.post_service.all_at_location(moscow).await.unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].post.category_id, Some(travel));
}

#[tokio::test]
async fn test_login_limit_follows_the_account_across_username_and_email() {
    let app = TestApp::new().await;
    app.state
        .user_service
        .register(CreateUserInput {
            username: "dana".to_string(),
            email: "dana@example.com".to_string(),
            password: PASSWORD.to_string(),
            password_confirm: PASSWORD.to_string(),
        })
        .await
        .unwrap();

    for _ in 0..5 {
        let response = app.post_form("/auth/login/", None, "username=dana&password=wrong").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let body = format!("username=dana%40example.com&password={}", PASSWORD);
    let response = app.post_form("/auth/login/", None, &body).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
}
