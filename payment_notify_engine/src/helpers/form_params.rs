use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormParseError {
    #[error("Body is not a valid form-encoded string. {0}")]
    Malformed(String),
    #[error("Parameter '{0}' appears more than once")]
    DuplicateKey(String),
}

/// The parameters of an `application/x-www-form-urlencoded` body, in the order they were received.
///
/// Duplicate keys are rejected outright. A gateway never sends them, and accepting them would make the signed string
/// ambiguous.
#[derive(Debug, Clone, Default)]
pub struct FormParams {
    pairs: Vec<(String, String)>,
}

impl FormParams {
    pub fn parse(body: &[u8]) -> Result<Self, FormParseError> {
        let pairs = serde_urlencoded::from_bytes::<Vec<(String, String)>>(body)
            .map_err(|e| FormParseError::Malformed(e.to_string()))?;
        for (i, (key, _)) in pairs.iter().enumerate() {
            if pairs[..i].iter().any(|(k, _)| k == key) {
                return Err(FormParseError::DuplicateKey(key.clone()));
            }
        }
        Ok(Self { pairs })
    }

    /// Returns the value for `key`, treating empty values as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str()).filter(|v| !v.is_empty())
    }

    /// Sorts the non-empty parameters by key, skipping `exclude`, and joins them as `k=v&k=v` using the decoded values.
    pub fn canonical_string(&self, exclude: &[&str]) -> String {
        let mut pairs = self
            .pairs
            .iter()
            .filter(|(k, v)| !v.is_empty() && !exclude.contains(&k.as_str()))
            .collect::<Vec<_>>();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        pairs.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&")
    }
}
