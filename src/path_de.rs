use serde::de::DeserializeOwned;

use crate::error::DeclError;

/// Deserialize with JSON-path context in error messages.
pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T, DeclError> {
    let de = &mut serde_json::Deserializer::from_str(src);
    serde_path_to_error::deserialize::<_, T>(de).map_err(into_decl_error)
}

pub fn from_slice_with_path<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DeclError> {
    let de = &mut serde_json::Deserializer::from_slice(bytes);
    serde_path_to_error::deserialize::<_, T>(de).map_err(into_decl_error)
}

fn into_decl_error(err: serde_path_to_error::Error<serde_json::Error>) -> DeclError {
    let path = err.path().to_string();
    DeclError::Syntax { path, message: err.into_inner().to_string() }
}
