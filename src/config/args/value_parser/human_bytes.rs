use byte_unit::Byte;
use std::str::FromStr;

const UNDER_MIN_PART_SIZE: &str = "must be greater than or equal to 100KiB";
const OVER_MAX_PART_SIZE: &str = "must be smaller than or equal to 5GiB";
const TOO_LARGE_VALUE: &str = "must be smaller than or equal to 8EiB";

const MIN_PART_SIZE: u128 = 100 * 1024;
const MAX_PART_SIZE: u128 = 5 * 1024 * 1024 * 1024;

pub fn check_part_size(value: &str) -> Result<String, String> {
    let result = Byte::from_str(value).map_err(|e| e.to_string())?;

    if result.as_u128() < MIN_PART_SIZE {
        return Err(UNDER_MIN_PART_SIZE.to_string());
    }
    if result.as_u128() > MAX_PART_SIZE {
        return Err(OVER_MAX_PART_SIZE.to_string());
    }

    Ok(value.to_string())
}

pub fn parse_part_size(value: &str) -> Result<u64, String> {
    check_part_size(value)?;

    let result = Byte::from_str(value).map_err(|e| e.to_string())?;
    TryInto::<u64>::try_into(result.as_u128()).map_err(|_| OVER_MAX_PART_SIZE.to_string())
}

pub fn check_human_bytes_without_limit(value: &str) -> Result<String, String> {
    let result = Byte::from_str(value).map_err(|e| e.to_string())?;
    if i64::MAX as u128 <= result.as_u128() {
        return Err(TOO_LARGE_VALUE.to_string());
    }

    Ok(value.to_string())
}

pub fn parse_human_bytes_without_limit(value: &str) -> Result<u64, String> {
    check_human_bytes_without_limit(value)?;

    let result = Byte::from_str(value).map_err(|e| e.to_string())?;
    TryInto::<u64>::try_into(result.as_u128()).map_err(|_| TOO_LARGE_VALUE.to_string())
}
