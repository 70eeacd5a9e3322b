use serde::{Deserialize, Deserializer, Serialize};
use utoipa::{IntoParams, ToSchema};

const DEFAULT_LIMIT: u64 = 20;
const MAX_LIMIT: u64 = 1000;

/// `?limit=&offset=` 分页参数。两个值都接受数字或字符串形式
/// （浏览器端的查询串永远是字符串）。
#[derive(Debug, Clone, Serialize, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct PaginationParams {
    /// 每页条数（默认 20，上限 1000）
    #[param(required = false)]
    #[serde(default, deserialize_with = "lenient_u64")]
    pub limit: Option<u64>,
    /// 偏移量（默认 0）
    #[param(required = false)]
    #[serde(default, deserialize_with = "lenient_u64")]
    pub offset: Option<u64>,
}

impl PaginationParams {
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT) as usize
    }

    pub fn offset(&self) -> usize {
        self.offset.unwrap_or(0) as usize
    }
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_clamping() {
        let p = PaginationParams {
            limit: None,
            offset: None,
        };
        assert_eq!(p.limit(), 20);
        assert_eq!(p.offset(), 0);

        let p = PaginationParams {
            limit: Some(10_000),
            offset: Some(40),
        };
        assert_eq!(p.limit(), 1000);
        assert_eq!(p.offset(), 40);
    }

    #[test]
    fn parses_string_query_values() {
        let p: PaginationParams =
            serde_json::from_str(r#"{"limit": "50", "offset": "10"}"#).unwrap();
        assert_eq!(p.limit(), 50);
        assert_eq!(p.offset(), 10);
        assert!(serde_json::from_str::<PaginationParams>(r#"{"limit": "x"}"#).is_err());
    }
}
