use crate::types::storage_url::{EncodingType, StorageUrl};

const NO_PATH_SPECIFIED: &str = "path must be specified.";

pub fn check_storage_url(url: &str) -> Result<String, String> {
    if url.is_empty() {
        return Err(NO_PATH_SPECIFIED.to_string());
    }

    // Percent-decoding depends on --encoding-type and is applied when the config is built.
    StorageUrl::parse(url, EncodingType::None)?;

    Ok(url.to_string())
}
