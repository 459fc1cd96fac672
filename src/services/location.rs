//! Location service

use crate::db::repositories::LocationRepository;
use crate::models::{Location, LocationInput, PostInput};
use crate::services::validation::FieldErrors;
use anyhow::Context;
use std::sync::Arc;

pub const NAME_MAX_LENGTH: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum LocationServiceError {
    #[error("Location not found: {0}")]
    NotFound(i64),

    #[error("Validation error: {0}")]
    ValidationError(FieldErrors),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<FieldErrors> for LocationServiceError {
    fn from(errors: FieldErrors) -> Self {
        LocationServiceError::ValidationError(errors)
    }
}

pub struct LocationService {
    repo: Arc<dyn LocationRepository>,
}

impl LocationService {
    pub fn new(repo: Arc<dyn LocationRepository>) -> Self {
        Self { repo }
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Location, LocationServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get location")?
            .ok_or(LocationServiceError::NotFound(id))
    }

    /// Every location, ordered by name
    pub async fn list(&self) -> Result<Vec<Location>, LocationServiceError> {
        Ok(self.repo.list().await.context("Failed to list locations")?)
    }

    pub async fn count(&self) -> Result<i64, LocationServiceError> {
        Ok(self.repo.count().await.context("Failed to count locations")?)
    }

    pub async fn create(&self, input: LocationInput) -> Result<Location, LocationServiceError> {
        let input = validate(input)?;
        let location = self
            .repo
            .create(&input)
            .await
            .context("Failed to create location")?;
        tracing::info!(location_id = location.id, "Location created");
        Ok(location)
    }

    pub async fn update(&self, id: i64, input: LocationInput) -> Result<Location, LocationServiceError> {
        self.update_with_post(id, input, None).await
    }

    /// Update a location, adding `post` (author ID and input) in the same
    /// transaction when one is given
    pub async fn update_with_post(
        &self,
        id: i64,
        input: LocationInput,
        post: Option<(i64, &PostInput)>,
    ) -> Result<Location, LocationServiceError> {
        self.get_by_id(id).await?;
        let input = validate(input)?;
        let location = match post {
            Some((author_id, post)) => self
                .repo
                .update_with_post(id, &input, author_id, post)
                .await
                .context("Failed to update location with post")?,
            None => self
                .repo
                .update(id, &input)
                .await
                .context("Failed to update location")?,
        };
        Ok(location)
    }

    /// Delete a location; posts tagged with it lose the tag
    pub async fn delete(&self, id: i64) -> Result<(), LocationServiceError> {
        self.get_by_id(id).await?;
        self.repo
            .delete(id)
            .await
            .context("Failed to delete location")?;
        tracing::info!(location_id = id, "Location deleted");
        Ok(())
    }
}

fn validate(input: LocationInput) -> Result<LocationInput, FieldErrors> {
    let input = LocationInput {
        name: input.name.trim().to_string(),
        is_published: input.is_published,
    };

    let mut errors = FieldErrors::new();
    if errors.require("name", &input.name) {
        errors.max_chars("name", &input.name, NAME_MAX_LENGTH);
    }
    errors.into_result()?;
    Ok(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxLocationRepository;
    use crate::db::{create_test_pool, migrations};

    async fn setup() -> LocationService {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        LocationService::new(SqlxLocationRepository::boxed(pool))
    }

    #[tokio::test]
    async fn test_crud() {
        let service = setup().await;
        let created = service
            .create(LocationInput { name: "  Moscow ".into(), is_published: true })
            .await
            .unwrap();
        assert_eq!(created.name, "Moscow");

        let updated = service
            .update(created.id, LocationInput { name: "Kazan".into(), is_published: false })
            .await
            .unwrap();
        assert_eq!(updated.name, "Kazan");
        assert!(!updated.is_published);
        assert_eq!(service.count().await.unwrap(), 1);

        service.delete(created.id).await.unwrap();
        assert!(matches!(service.get_by_id(created.id).await, Err(LocationServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_name_is_required_and_bounded() {
        let service = setup().await;

        let blank = service
            .create(LocationInput { name: "   ".into(), is_published: true })
            .await;
        assert!(matches!(blank, Err(LocationServiceError::ValidationError(e)) if e.has("name")));

        let long = service
            .create(LocationInput { name: "x".repeat(NAME_MAX_LENGTH + 1), is_published: true })
            .await;
        assert!(matches!(long, Err(LocationServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_update_missing_location() {
        let service = setup().await;
        let result = service
            .update(42, LocationInput { name: "Nowhere".into(), is_published: true })
            .await;
        assert!(matches!(result, Err(LocationServiceError::NotFound(42))));
    }
}
