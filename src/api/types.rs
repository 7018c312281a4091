//! Request and response DTOs for the API.

use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::guard::ReadinessPhase;
use crate::telegram::EntityRef;

pub const DEFAULT_SEARCH_LIMIT: usize = 5;
pub const DEFAULT_PAGE_LIMIT: usize = 10;

/// A JSON number, or a string holding one.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum NumberOrString {
    Number(i64),
    Text(String),
}

impl NumberOrString {
    fn as_i64(&self, field: &str) -> Result<i64, ApiError> {
        match self {
            NumberOrString::Number(n) => Ok(*n),
            NumberOrString::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| ApiError::BadRequest(format!("{field} must be an integer"))),
        }
    }
}

fn parse_limit(raw: Option<&NumberOrString>, default: usize) -> Result<usize, ApiError> {
    match raw {
        None => Ok(default),
        Some(value) => usize::try_from(value.as_i64("limit")?)
            .map_err(|_| ApiError::BadRequest("limit must not be negative".to_string())),
    }
}

/// POST /search_entities body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchEntitiesRequest {
    pub keyword: Option<String>,
    pub limit: Option<NumberOrString>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub keyword: String,
    pub limit: usize,
}

impl SearchEntitiesRequest {
    pub fn validate(&self) -> Result<SearchQuery, ApiError> {
        let keyword = self
            .keyword
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ApiError::BadRequest("Keyword is required".to_string()))?;

        Ok(SearchQuery {
            keyword: keyword.to_string(),
            limit: parse_limit(self.limit.as_ref(), DEFAULT_SEARCH_LIMIT)?,
        })
    }
}

/// POST /get_messages and /get_members body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntityRequest {
    pub entity_id: Option<NumberOrString>,
    pub entity_username: Option<String>,
    pub limit: Option<NumberOrString>,
    pub offset_id: Option<NumberOrString>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityQuery {
    pub entity: EntityRef,
    pub limit: usize,
    pub offset_id: i32,
}

impl EntityRequest {
    /// `entity_id` wins over `entity_username`; zero and blank values count as
    /// absent.
    pub fn entity(&self) -> Result<EntityRef, ApiError> {
        let from_id = match &self.entity_id {
            Some(NumberOrString::Number(0)) | None => None,
            Some(NumberOrString::Number(n)) => Some(EntityRef::Id(*n)),
            Some(NumberOrString::Text(s)) => EntityRef::parse(s),
        };

        from_id
            .or_else(|| self.entity_username.as_deref().and_then(EntityRef::parse))
            .ok_or_else(|| {
                ApiError::BadRequest("Either entity_id or entity_username is required".to_string())
            })
    }

    pub fn validate(&self) -> Result<EntityQuery, ApiError> {
        let entity = self.entity()?;
        let limit = parse_limit(self.limit.as_ref(), DEFAULT_PAGE_LIMIT)?;
        let offset_id = match &self.offset_id {
            None => 0,
            Some(value) => i32::try_from(value.as_i64("offset_id")?)
                .ok()
                .filter(|id| *id >= 0)
                .ok_or_else(|| {
                    ApiError::BadRequest("offset_id must be a non-negative message id".to_string())
                })?,
        };

        Ok(EntityQuery {
            entity,
            limit,
            offset_id,
        })
    }
}

/// GET /health response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub phase: ReadinessPhase,
    pub version: String,
    pub uptime_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity_request(body: serde_json::Value) -> EntityRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_search_defaults() {
        let req: SearchEntitiesRequest = serde_json::from_value(json!({"keyword": " rust "})).unwrap();
        assert_eq!(
            req.validate().unwrap(),
            SearchQuery {
                keyword: "rust".to_string(),
                limit: DEFAULT_SEARCH_LIMIT
            }
        );
    }

    #[test]
    fn test_search_limit_as_string() {
        let req: SearchEntitiesRequest =
            serde_json::from_value(json!({"keyword": "rust", "limit": "3"})).unwrap();
        assert_eq!(req.validate().unwrap().limit, 3);
    }

    #[test]
    fn test_search_requires_keyword() {
        let req: SearchEntitiesRequest = serde_json::from_value(json!({"keyword": "  "})).unwrap();
        let err = req.validate().unwrap_err();
        assert_eq!(err.to_string(), "Keyword is required");
    }

    #[test]
    fn test_bad_limit_is_rejected() {
        let req: SearchEntitiesRequest =
            serde_json::from_value(json!({"keyword": "rust", "limit": "many"})).unwrap();
        assert!(matches!(req.validate(), Err(ApiError::BadRequest(_))));

        let req: SearchEntitiesRequest =
            serde_json::from_value(json!({"keyword": "rust", "limit": -1})).unwrap();
        assert!(matches!(req.validate(), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_entity_from_id_number_or_string() {
        assert_eq!(
            entity_request(json!({"entity_id": 12345})).entity().unwrap(),
            EntityRef::Id(12345)
        );
        assert_eq!(
            entity_request(json!({"entity_id": "-1001234567890"})).entity().unwrap(),
            EntityRef::Id(-1001234567890)
        );
    }

    #[test]
    fn test_entity_from_username() {
        assert_eq!(
            entity_request(json!({"entity_username": "@rustlang"})).entity().unwrap(),
            EntityRef::Username("rustlang".to_string())
        );
        // A zero id falls through to the username.
        assert_eq!(
            entity_request(json!({"entity_id": 0, "entity_username": "rustlang"}))
                .entity()
                .unwrap(),
            EntityRef::Username("rustlang".to_string())
        );
    }

    #[test]
    fn test_entity_missing() {
        let err = entity_request(json!({"limit": 5})).entity().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Either entity_id or entity_username is required"
        );
        assert!(entity_request(json!({"entity_username": ""})).entity().is_err());
    }

    #[test]
    fn test_entity_query_defaults_and_offset() {
        let query = entity_request(json!({"entity_id": 1})).validate().unwrap();
        assert_eq!(query.limit, DEFAULT_PAGE_LIMIT);
        assert_eq!(query.offset_id, 0);

        let query = entity_request(json!({"entity_id": 1, "offset_id": "29", "limit": 2}))
            .validate()
            .unwrap();
        assert_eq!(query.offset_id, 29);
        assert_eq!(query.limit, 2);

        assert!(entity_request(json!({"entity_id": 1, "offset_id": -5}))
            .validate()
            .is_err());
    }
}
