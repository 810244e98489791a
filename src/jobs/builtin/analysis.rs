//! Polygon analysis job: vertex count, bounding box and centroid.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use super::{Polygon, Position, parse_polygons};
use crate::error::JobError;
use crate::jobs::job::{Job, Outcome};
use crate::workflows::model::Task;

/// Summarizes the shape of the task's polygon.
///
/// When the task has a bound `input` (its predecessor's output), it is
/// carried through under `upstream`.
pub struct AnalysisJob;

#[async_trait]
impl Job for AnalysisJob {
    fn task_type(&self) -> &str {
        "analysis"
    }

    fn description(&self) -> &str {
        "Vertex count, bounding box and centroid of the submitted polygon"
    }

    async fn execute(&self, task: &Task) -> Result<Outcome, JobError> {
        let polygons = parse_polygons(task.id, &task.geo_json)?;

        let vertices: Vec<Position> = polygons.iter().flat_map(open_rings).flatten().collect();
        let outer: Vec<Position> = polygons
            .iter()
            .filter_map(|p| p.first())
            .flat_map(|ring| open_ring(ring).iter().copied())
            .collect();

        let mut min = [f64::INFINITY; 2];
        let mut max = [f64::NEG_INFINITY; 2];
        for [lon, lat] in &vertices {
            min = [min[0].min(*lon), min[1].min(*lat)];
            max = [max[0].max(*lon), max[1].max(*lat)];
        }

        let count = outer.len().max(1) as f64;
        let centroid = [
            outer.iter().map(|p| p[0]).sum::<f64>() / count,
            outer.iter().map(|p| p[1]).sum::<f64>() / count,
        ];

        let upstream = task
            .input
            .as_deref()
            .map(|raw| serde_json::from_str::<Value>(raw).unwrap_or_else(|_| json!(raw)));

        info!(
            task_id = %task.id,
            polygons = polygons.len(),
            vertices = vertices.len(),
            "Analyzed polygon"
        );

        let mut result = json!({
            "polygonCount": polygons.len(),
            "vertexCount": vertices.len(),
            "bbox": [min[0], min[1], max[0], max[1]],
            "centroid": centroid,
        });
        if let Some(upstream) = upstream {
            result["upstream"] = upstream;
        }
        Ok(Outcome::Value(result))
    }
}

/// Ring positions without the closing duplicate.
fn open_ring(ring: &[Position]) -> &[Position] {
    match (ring.first(), ring.last()) {
        (Some(first), Some(last)) if ring.len() > 1 && first == last => &ring[..ring.len() - 1],
        _ => ring,
    }
}

fn open_rings(polygon: &Polygon) -> impl Iterator<Item = Vec<Position>> + '_ {
    polygon.iter().map(|ring| open_ring(ring).to_vec())
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::jobs::builtin::fixtures::BRAZIL_POLYGON;

    async fn analyze(task: &Task) -> Value {
        match AnalysisJob.execute(task).await.unwrap() {
            Outcome::Value(v) => v,
            Outcome::Waiting => panic!("analysis never waits"),
        }
    }

    #[tokio::test]
    async fn summarizes_rectangle() {
        let task = Task::new(Uuid::new_v4(), 2, "c", "analysis", BRAZIL_POLYGON);
        let value = analyze(&task).await;

        assert_eq!(value["polygonCount"], 1);
        assert_eq!(value["vertexCount"], 4);
        let bbox: Vec<f64> = serde_json::from_value(value["bbox"].clone()).unwrap();
        assert_eq!(
            bbox,
            vec![
                -46.76235118226248,
                -16.695249531930827,
                -46.159527846351466,
                -16.048997734633218
            ]
        );
        let centroid: Vec<f64> = serde_json::from_value(value["centroid"].clone()).unwrap();
        assert!((centroid[0] - -46.460939514306970).abs() < 1e-9);
        assert!((centroid[1] - -16.372123633282023).abs() < 1e-9);
        assert!(value.get("upstream").is_none());
    }

    #[tokio::test]
    async fn carries_bound_input() {
        let mut task = Task::new(Uuid::new_v4(), 2, "c", "analysis", BRAZIL_POLYGON);
        task.input = Some("4631853809.79".into());
        let value = analyze(&task).await;
        assert_eq!(value["upstream"], json!(4631853809.79));

        task.input = Some("Brazil".into());
        let value = analyze(&task).await;
        assert_eq!(value["upstream"], json!("Brazil"));
    }
}
