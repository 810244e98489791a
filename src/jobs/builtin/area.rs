//! Polygon area job.

use async_trait::async_trait;
use tracing::info;

use super::{Polygon, Ring, parse_polygons};
use crate::error::JobError;
use crate::jobs::job::{Job, Outcome};
use crate::workflows::model::Task;

/// WGS84 equatorial radius in metres.
const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Computes the geodesic area of the task's GeoJSON in square metres.
pub struct AreaJob;

#[async_trait]
impl Job for AreaJob {
    fn task_type(&self) -> &str {
        "area"
    }

    fn description(&self) -> &str {
        "Geodesic area of the submitted polygon, in square metres"
    }

    async fn execute(&self, task: &Task) -> Result<Outcome, JobError> {
        let polygons = parse_polygons(task.id, &task.geo_json)?;
        let area: f64 = polygons.iter().map(polygon_area).sum();
        info!(task_id = %task.id, area_m2 = area, "Computed polygon area");
        Ok(Outcome::Value(serde_json::json!(area)))
    }
}

/// Outer ring area minus the area of every hole.
pub(crate) fn polygon_area(polygon: &Polygon) -> f64 {
    let mut rings = polygon.iter();
    let Some(outer) = rings.next() else {
        return 0.0;
    };
    rings.fold(ring_area(outer).abs(), |acc, hole| acc - ring_area(hole).abs())
}

/// Signed area of a ring on a sphere (spherical excess approximation).
fn ring_area(ring: &Ring) -> f64 {
    let n = ring.len().saturating_sub(1);
    if n <= 2 {
        return 0.0;
    }

    let mut total = 0.0;
    for i in 0..n {
        let lower = ring[i];
        let middle = ring[if i + 1 == n { 0 } else { i + 1 }];
        let upper = ring[if i + 2 >= n { (i + 2) % n } else { i + 2 }];
        total += (upper[0].to_radians() - lower[0].to_radians()) * middle[1].to_radians().sin();
    }
    total * EARTH_RADIUS_M * EARTH_RADIUS_M / 2.0
}
