//! Request builders for the Space-Track query endpoints.

use chrono::NaiveDate;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::error::{OrbitTrackError, Result};
use crate::transport::HttpRequest;

const QUERY_ROOT: &str = "/basicspacedata/query/class";

/// Characters left as-is in a path segment. Commas stay literal so value
/// lists like `25544,43013` keep working.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b',');

fn segment(name: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(OrbitTrackError::InvalidRequest(format!("{name} must not be empty")));
    }
    Ok(utf8_percent_encode(value, SEGMENT).to_string())
}

/// Latest GP element set for every object matching `filter = value`,
/// e.g. `("norad_cat_id", "25544")`.
pub fn gp(filter: &str, value: &str) -> Result<HttpRequest> {
    Ok(HttpRequest::get(format!(
        "{QUERY_ROOT}/gp/{}/{}/orderby/CREATION_DATE%20asc/emptyresult/show",
        segment("filter", filter)?,
        segment("value", value)?,
    )))
}

/// Every historical GP element set for the matching objects.
pub fn all_gp_history(filter: &str, value: &str) -> Result<HttpRequest> {
    Ok(HttpRequest::get(format!(
        "{QUERY_ROOT}/gp_history/{}/{}/orderby/NORAD_CAT_ID%20asc/emptyresult/show",
        segment("filter", filter)?,
        segment("value", value)?,
    )))
}

/// Historical GP element sets with an epoch between `start` and `end`.
pub fn gp_history(
    filter: &str,
    value: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<HttpRequest> {
    if start > end {
        return Err(OrbitTrackError::InvalidRequest(format!(
            "start date {start} is after end date {end}"
        )));
    }
    Ok(HttpRequest::get(format!(
        "{QUERY_ROOT}/gp_history/{}/{}/EPOCH/{}--{}/orderby/EPOCH%20asc/emptyresult/show",
        segment("filter", filter)?,
        segment("value", value)?,
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d"),
    )))
}

pub fn announcements() -> HttpRequest {
    HttpRequest::get(format!("{QUERY_ROOT}/announcement"))
}

/// Any query path, used verbatim apart from a leading `/`.
pub fn custom(path: &str) -> Result<HttpRequest> {
    let path = path.trim();
    if path.is_empty() || path == "/" {
        return Err(OrbitTrackError::InvalidRequest("query path must not be empty".to_string()));
    }
    if path.starts_with('/') {
        Ok(HttpRequest::get(path))
    } else {
        Ok(HttpRequest::get(format!("/{path}")))
    }
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(date: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|e| OrbitTrackError::InvalidRequest(format!("invalid date '{date}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[test]
    fn test_gp_path() {
        let request = gp("norad_cat_id", "25544").unwrap();
        assert_eq!(
            request.path,
            "/basicspacedata/query/class/gp/norad_cat_id/25544/orderby/CREATION_DATE%20asc/emptyresult/show"
        );
    }

    #[test]
    fn test_all_gp_history_path() {
        let request = all_gp_history("norad_cat_id", "25544,43013").unwrap();
        assert_eq!(
            request.path,
            "/basicspacedata/query/class/gp_history/norad_cat_id/25544,43013/orderby/NORAD_CAT_ID%20asc/emptyresult/show"
        );
    }

    #[test]
    fn test_gp_history_path_with_dates() {
        let request =
            gp_history("norad_cat_id", "25544", date("2024-01-01"), date("2024-01-31")).unwrap();
        assert_eq!(
            request.path,
            "/basicspacedata/query/class/gp_history/norad_cat_id/25544/EPOCH/2024-01-01--2024-01-31/orderby/EPOCH%20asc/emptyresult/show"
        );
    }

    #[test]
    fn test_gp_history_rejects_reversed_range() {
        let err = gp_history("norad_cat_id", "25544", date("2024-02-01"), date("2024-01-01"))
            .unwrap_err();
        assert!(matches!(err, OrbitTrackError::InvalidRequest(_)));
    }

    #[test]
    fn test_segments_are_encoded() {
        let request = gp("object_name", "ISS (ZARYA)/x").unwrap();
        assert!(request.path.contains("/object_name/ISS%20%28ZARYA%29%2Fx/"));
        assert!(gp("norad_cat_id", "  ").is_err());
    }

    #[test]
    fn test_custom_path_gets_leading_slash() {
        assert_eq!(
            custom("basicspacedata/query/class/boxscore").unwrap().path,
            "/basicspacedata/query/class/boxscore"
        );
        assert_eq!(custom("/a/b").unwrap().path, "/a/b");
        assert!(custom("").is_err());
    }

    #[test]
    fn test_parse_date_rejects_other_formats() {
        assert!(parse_date("2024/01/01").is_err());
        assert_eq!(date("2024-03-05"), NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
    }
}
