//! Record shapes returned by the query endpoints.
//!
//! Space-Track serializes most numbers as JSON strings, so numeric fields
//! accept either form. Every field is optional and unknown fields are kept
//! in `extra`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_with::{serde_as, DisplayFromStr, PickFirst};

/// One general perturbations (GP) element set.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct GpRecord {
    pub ccsds_omm_vers: Option<String>,
    pub comment: Option<String>,
    pub creation_date: Option<String>,
    pub originator: Option<String>,
    pub object_name: Option<String>,
    pub object_id: Option<String>,
    pub center_name: Option<String>,
    pub ref_frame: Option<String>,
    pub time_system: Option<String>,
    pub mean_element_theory: Option<String>,
    pub epoch: Option<String>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub mean_motion: Option<f64>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub eccentricity: Option<f64>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub inclination: Option<f64>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub ra_of_asc_node: Option<f64>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub arg_of_pericenter: Option<f64>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub mean_anomaly: Option<f64>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub ephemeris_type: Option<i64>,
    pub classification_type: Option<String>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub norad_cat_id: Option<u64>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub element_set_no: Option<i64>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub rev_at_epoch: Option<i64>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub bstar: Option<f64>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub mean_motion_dot: Option<f64>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub mean_motion_ddot: Option<f64>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub semimajor_axis: Option<f64>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub period: Option<f64>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub apoapsis: Option<f64>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub periapsis: Option<f64>,
    pub object_type: Option<String>,
    pub rcs_size: Option<String>,
    pub country_code: Option<String>,
    pub launch_date: Option<String>,
    pub site: Option<String>,
    pub decay_date: Option<String>,
    pub file: Option<String>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub gp_id: Option<u64>,
    pub tle_line0: Option<String>,
    pub tle_line1: Option<String>,
    pub tle_line2: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GpRecord {
    /// Epoch as a UTC timestamp.
    pub fn epoch_time(&self) -> Option<NaiveDateTime> {
        let epoch = self.epoch.as_deref()?;
        NaiveDateTime::parse_from_str(epoch, "%Y-%m-%dT%H:%M:%S%.f").ok()
    }

    /// The two-line element set, when both lines are present.
    pub fn tle(&self) -> Option<(&str, &str)> {
        Some((self.tle_line1.as_deref()?, self.tle_line2.as_deref()?))
    }
}

/// A service announcement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Announcement {
    pub announcement_type: Option<String>,
    pub announcement_text: Option<String>,
    pub announcement_start: Option<String>,
    pub announcement_end: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
