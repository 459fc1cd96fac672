//! Who may read or change which record
//!
//! These are pure functions over already-loaded records so the handlers and
//! the tests share one definition. The SQL side of [`is_public`] lives in
//! `PostFilter::public`.

use chrono::{DateTime, Utc};

use crate::models::{Comment, PostWithMeta, User};

/// What a handler should do when a viewer may not edit a post
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditDecision {
    Allow,
    /// Send the viewer to the read-only detail page
    RedirectToDetail,
}

/// Published, in a published category, and not scheduled for later.
/// A post without a category is never public.
pub fn is_public(post: &PostWithMeta, now: DateTime<Utc>) -> bool {
    post.post.is_published
        && post.category.as_ref().is_some_and(|c| c.is_published)
        && post.post.pub_date <= now
}

/// Authors always see their own posts
pub fn can_view_unpublished(post: &PostWithMeta, viewer: Option<&User>) -> bool {
    viewer.is_some_and(|v| v.id == post.post.author_id)
}

/// Detail page and comment creation
pub fn can_view(post: &PostWithMeta, viewer: Option<&User>, now: DateTime<Utc>) -> bool {
    is_public(post, now) || can_view_unpublished(post, viewer)
}

pub fn can_edit_post(post: &PostWithMeta, viewer: &User) -> EditDecision {
    if viewer.id == post.post.author_id {
        EditDecision::Allow
    } else {
        EditDecision::RedirectToDetail
    }
}

/// A refused delete is reported as "not found"
pub fn can_delete_post(post: &PostWithMeta, viewer: &User) -> bool {
    viewer.id == post.post.author_id
}

/// Governs both editing and deleting a comment. A refusal is reported as
/// "not found", as is a comment addressed under the wrong post.
pub fn can_change_comment(comment: &Comment, post_id: i64, viewer: &User) -> bool {
    comment.post_id == post_id && comment.author_id == viewer.id
}

/// The owner's profile lists all of their posts, others see the public subset
pub fn can_see_unpublished_in_profile(profile: &User, viewer: Option<&User>) -> bool {
    viewer.is_some_and(|v| v.id == profile.id)
}

/// Gate for every administrative screen
pub fn is_staff(viewer: &User) -> bool {
    viewer.is_staff()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CategoryRef, Post, UserRole};
    use chrono::Duration;
    use proptest::prelude::*;

    fn user(id: i64, role: UserRole) -> User {
        let mut u = User::new(format!("u{}", id), String::new(), String::new(), role);
        u.id = id;
        u
    }

    fn post(author_id: i64, is_published: bool, category: Option<bool>, pub_date: DateTime<Utc>) -> PostWithMeta {
        PostWithMeta {
            post: Post {
                id: 1,
                title: "t".into(),
                text: "x".into(),
                pub_date,
                author_id,
                category_id: category.map(|_| 7),
                location_id: None,
                is_published,
                created_at: pub_date,
            },
            author_username: format!("u{}", author_id),
            category: category.map(|published| CategoryRef {
                id: 7,
                title: "c".into(),
                slug: "c".into(),
                is_published: published,
            }),
            location: None,
            comment_count: 0,
        }
    }

    #[test]
    fn test_public_post_is_visible_to_everyone() {
        let now = Utc::now();
        let p = post(1, true, Some(true), now - Duration::minutes(1));
        assert!(is_public(&p, now));
        assert!(can_view(&p, None, now));
        assert!(can_view(&p, Some(&user(2, UserRole::Author)), now));
    }

    #[test]
    fn test_unpublished_post_hidden_from_anonymous_and_others() {
        let now = Utc::now();
        let p = post(1, false, Some(true), now);
        assert!(!can_view(&p, None, now));
        assert!(!can_view(&p, Some(&user(2, UserRole::Author)), now));
        // Staff get no special read access on the public site
        assert!(!can_view(&p, Some(&user(3, UserRole::Admin)), now));
    }

    #[test]
    fn test_author_sees_own_unpublished_post() {
        let now = Utc::now();
        let p = post(1, false, None, now + Duration::days(3));
        assert!(can_view(&p, Some(&user(1, UserRole::Author)), now));
    }

    #[test]
    fn test_post_without_category_is_never_public() {
        let now = Utc::now();
        assert!(!is_public(&post(1, true, None, now - Duration::days(1)), now));
    }

    #[test]
    fn test_edit_and_delete_are_author_only() {
        let now = Utc::now();
        let p = post(1, true, Some(true), now);
        assert_eq!(can_edit_post(&p, &user(1, UserRole::Author)), EditDecision::Allow);
        assert_eq!(can_edit_post(&p, &user(2, UserRole::Admin)), EditDecision::RedirectToDetail);
        assert!(can_delete_post(&p, &user(1, UserRole::Author)));
        assert!(!can_delete_post(&p, &user(2, UserRole::Author)));
    }

    #[test]
    fn test_comment_change_requires_author_and_matching_post() {
        let comment = Comment {
            id: 5,
            text: "hi".into(),
            post_id: 10,
            author_id: 1,
            created_at: Utc::now(),
        };
        assert!(can_change_comment(&comment, 10, &user(1, UserRole::Author)));
        assert!(!can_change_comment(&comment, 11, &user(1, UserRole::Author)));
        assert!(!can_change_comment(&comment, 10, &user(2, UserRole::Admin)));
    }

    #[test]
    fn test_profile_rule() {
        let owner = user(1, UserRole::Author);
        assert!(can_see_unpublished_in_profile(&owner, Some(&owner)));
        assert!(!can_see_unpublished_in_profile(&owner, Some(&user(2, UserRole::Admin))));
        assert!(!can_see_unpublished_in_profile(&owner, None));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn public_iff_all_three_conditions_hold(
            is_published in any::<bool>(),
            category in prop_oneof![Just(None), any::<bool>().prop_map(Some)],
            offset_minutes in -10_000i64..10_000,
        ) {
            let now = Utc::now();
            let p = post(1, is_published, category, now + Duration::minutes(offset_minutes));
            let expected = is_published && category == Some(true) && offset_minutes <= 0;
            prop_assert_eq!(is_public(&p, now), expected);
        }

        #[test]
        fn only_the_author_may_change_a_post(author in 1i64..20, viewer in 1i64..20) {
            let now = Utc::now();
            let p = post(author, true, Some(true), now);
            let v = user(viewer, UserRole::Author);
            prop_assert_eq!(can_delete_post(&p, &v), author == viewer);
            prop_assert_eq!(can_edit_post(&p, &v) == EditDecision::Allow, author == viewer);
        }

        #[test]
        fn viewing_never_requires_more_than_authorship(
            author in 1i64..5,
            viewer in prop_oneof![Just(None), (1i64..5).prop_map(Some)],
            is_published in any::<bool>(),
        ) {
            let now = Utc::now();
            let p = post(author, is_published, Some(true), now - Duration::hours(1));
            let v = viewer.map(|id| user(id, UserRole::Author));
            let expected = is_published || viewer == Some(author);
            prop_assert_eq!(can_view(&p, v.as_ref(), now), expected);
        }
    }
}
