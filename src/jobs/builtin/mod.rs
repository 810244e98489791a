//! Built-in jobs and the GeoJSON helpers they share.

mod analysis;
mod area;
mod notification;
mod report;

pub use analysis::AnalysisJob;
pub use area::AreaJob;
pub use notification::NotificationJob;
pub use report::ReportJob;

use serde_json::Value;
use uuid::Uuid;

use crate::error::JobError;

/// `[lon, lat]` in degrees.
pub(crate) type Position = [f64; 2];
/// Closed ring of positions (first == last).
pub(crate) type Ring = Vec<Position>;
/// Outer ring followed by any holes.
pub(crate) type Polygon = Vec<Ring>;

/// Extract every polygon from a GeoJSON document.
///
/// Accepts `Polygon`, `MultiPolygon`, a `Feature` wrapping either, and a
/// `FeatureCollection` of such features. Other geometries are ignored.
pub(crate) fn parse_polygons(task_id: Uuid, geo_json: &str) -> Result<Vec<Polygon>, JobError> {
    let value: Value = serde_json::from_str(geo_json).map_err(|e| JobError::InvalidInput {
        task_id,
        reason: format!("GeoJSON is not valid JSON: {e}"),
    })?;

    let mut polygons = Vec::new();
    collect_polygons(task_id, &value, &mut polygons)?;
    if polygons.is_empty() {
        return Err(JobError::InvalidInput {
            task_id,
            reason: "GeoJSON contains no polygon".into(),
        });
    }
    Ok(polygons)
}

fn collect_polygons(task_id: Uuid, value: &Value, out: &mut Vec<Polygon>) -> Result<(), JobError> {
    let kind = value.get("type").and_then(|t| t.as_str()).unwrap_or_default();
    match kind {
        "Polygon" => out.push(polygon_coords(task_id, coordinates(value))?),
        "MultiPolygon" => {
            let polys = coordinates(value).as_array().cloned().unwrap_or_default();
            for poly in &polys {
                out.push(polygon_coords(task_id, poly)?);
            }
        }
        "Feature" => {
            if let Some(geometry) = value.get("geometry") {
                collect_polygons(task_id, geometry, out)?;
            }
        }
        "FeatureCollection" => {
            if let Some(features) = value.get("features").and_then(|f| f.as_array()) {
                for feature in features {
                    collect_polygons(task_id, feature, out)?;
                }
            }
        }
        _ => {}
    }
    Ok(())
}

fn coordinates(value: &Value) -> &Value {
    value.get("coordinates").unwrap_or(&Value::Null)
}

fn polygon_coords(task_id: Uuid, coords: &Value) -> Result<Polygon, JobError> {
    let raw: Vec<Vec<Vec<f64>>> =
        serde_json::from_value(coords.clone()).map_err(|e| JobError::InvalidInput {
            task_id,
            reason: format!("bad polygon coordinates: {e}"),
        })?;

    raw.into_iter()
        .map(|ring| {
            ring.into_iter()
                .map(|pos| match pos.as_slice() {
                    [lon, lat, ..] => Ok([*lon, *lat]),
                    _ => Err(JobError::InvalidInput {
                        task_id,
                        reason: "position needs at least two numbers".into(),
                    }),
                })
                .collect()
        })
        .collect()
}
