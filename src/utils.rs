use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest},
    http::Request,
    Json,
};
use serde::{de, Deserialize, Deserializer};

use crate::error::ApiError;

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Int(i64),
    Str(String),
}

impl IdRepr {
    fn into_id<E: de::Error>(self) -> Result<Option<i64>, E> {
        match self {
            IdRepr::Int(id) => Ok(Some(id)),
            IdRepr::Str(s) if s.is_empty() => Ok(None),
            IdRepr::Str(s) => match s.parse::<i64>() {
                Ok(id) => Ok(Some(id)),
                Err(e) => Err(de::Error::custom(format!("invalid id {s:?}: {e}"))),
            },
        }
    }
}

/// An id sent either as a number or as a numeric string. Empty strings and
/// `null` count as absent.
pub fn opt_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<IdRepr>::deserialize(deserializer)? {
        Some(repr) => repr.into_id(),
        None => Ok(None),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdListRepr {
    List(Vec<IdRepr>),
    Encoded(String),
}

/// A list of ids, either as a JSON array or as a string holding a
/// JSON-encoded array (`"[\"1\",\"2\"]"`), which is how browsers send it.
pub fn opt_id_list<'de, D>(deserializer: D) -> Result<Option<Vec<i64>>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = match Option::<IdListRepr>::deserialize(deserializer)? {
        None => return Ok(None),
        Some(IdListRepr::List(items)) => items,
        Some(IdListRepr::Encoded(s)) if s.is_empty() => return Ok(None),
        Some(IdListRepr::Encoded(s)) => {
            serde_json::from_str::<Vec<IdRepr>>(&s).map_err(<D::Error as de::Error>::custom)?
        }
    };

    let mut ids = Vec::with_capacity(items.len());
    for item in items {
        if let Some(id) = item.into_id::<D::Error>()? {
            ids.push(id);
        }
    }
    Ok(Some(ids))
}

/// `Json` whose rejections come back in the API's error format.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, B, T> FromRequest<S, B> for JsonBody<T>
where
    Json<T>: FromRequest<S, B, Rejection = JsonRejection>,
    S: Send + Sync,
    B: Send + 'static,
{
    type Rejection = ApiError;

    async fn from_request(request: Request<B>, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(request, state)
            .await
            .map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize, Debug)]
    struct Form {
        #[serde(default, deserialize_with = "opt_id")]
        id: Option<i64>,
        #[serde(default, deserialize_with = "opt_id_list")]
        users: Option<Vec<i64>>,
    }

    fn parse(json: &str) -> Result<Form, serde_json::Error> {
        serde_json::from_str(json)
    }

    #[test]
    fn ids_from_numbers_and_strings() {
        assert_eq!(parse(r#"{"id": 7}"#).unwrap().id, Some(7));
        assert_eq!(parse(r#"{"id": "7"}"#).unwrap().id, Some(7));
        assert_eq!(parse(r#"{"id": ""}"#).unwrap().id, None);
        assert_eq!(parse(r#"{"id": null}"#).unwrap().id, None);
        assert_eq!(parse(r#"{}"#).unwrap().id, None);
        assert!(parse(r#"{"id": "seven"}"#).is_err());
    }

    #[test]
    fn id_lists_plain_or_encoded() {
        assert_eq!(
            parse(r#"{"users": [1, "2"]}"#).unwrap().users,
            Some(vec![1, 2])
        );
        assert_eq!(
            parse(r#"{"users": "[\"3\",4]"}"#).unwrap().users,
            Some(vec![3, 4])
        );
        assert_eq!(parse(r#"{"users": ""}"#).unwrap().users, None);
        assert!(parse(r#"{"users": "not json"}"#).is_err());
    }
}
