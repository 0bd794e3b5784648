//! `polygonArea`: geodesic area of a GeoJSON polygon.
//!
//! Accepts a `Polygon`, a `MultiPolygon`, or a `Feature` wrapping either.
//! The input may be the GeoJSON object itself or a string containing it.
//! Area is computed on a sphere of mean radius 6 371 008.8 m using the
//! spherical-excess ring formula; interior rings are subtracted.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::{ExecutionContext, TaskExecutionError, TaskHandler};

/// Mean Earth radius (IUGG), in metres.
const EARTH_RADIUS_M: f64 = 6_371_008.8;

type Ring = Vec<Vec<f64>>;

#[derive(Deserialize)]
struct PolygonCoords {
    coordinates: Vec<Ring>,
}

#[derive(Deserialize)]
struct MultiPolygonCoords {
    coordinates: Vec<Vec<Ring>>,
}

pub struct PolygonAreaHandler;

#[async_trait]
impl TaskHandler for PolygonAreaHandler {
    async fn run(&self, input: &Value, ctx: &ExecutionContext) -> Result<Value, TaskExecutionError> {
        let area = area_of(input)?;
        debug!(task_id = %ctx.task_id, area, "polygon area calculated");
        Ok(json!({ "area": area, "unit": "square meters" }))
    }
}

/// Area in square metres of the GeoJSON geometry in `input`.
pub fn area_of(input: &Value) -> Result<f64, TaskExecutionError> {
    let parsed;
    let geojson = match input {
        Value::String(raw) => {
            parsed = serde_json::from_str::<Value>(raw)
                .map_err(|e| TaskExecutionError::InvalidInput(format!("malformed GeoJSON: {e}")))?;
            &parsed
        }
        other => other,
    };

    let geometry = match type_of(geojson) {
        "Feature" => geojson
            .get("geometry")
            .ok_or_else(|| TaskExecutionError::InvalidInput("Feature has no geometry".into()))?,
        _ => geojson,
    };

    match type_of(geometry) {
        "Polygon" => {
            let poly: PolygonCoords = decode(geometry)?;
            polygon_area(&poly.coordinates)
        }
        "MultiPolygon" => {
            let multi: MultiPolygonCoords = decode(geometry)?;
            multi.coordinates.iter().map(|p| polygon_area(p)).sum()
        }
        other => Err(TaskExecutionError::InvalidInput(format!(
            "Invalid GeoJSON type: {other}. Expected Polygon or MultiPolygon."
        ))),
    }
}

fn type_of(value: &Value) -> &str {
    value.get("type").and_then(Value::as_str).unwrap_or("<missing>")
}

fn decode<T: for<'de> Deserialize<'de>>(value: &Value) -> Result<T, TaskExecutionError> {
    T::deserialize(value)
        .map_err(|e| TaskExecutionError::InvalidInput(format!("bad coordinates: {e}")))
}

/// Outer ring area minus the area of every hole.
fn polygon_area(rings: &[Ring]) -> Result<f64, TaskExecutionError> {
    let Some((outer, holes)) = rings.split_first() else {
        return Ok(0.0);
    };
    let mut total = ring_area(outer)?.abs();
    for hole in holes {
        total -= ring_area(hole)?.abs();
    }
    Ok(total)
}

fn ring_area(ring: &[Vec<f64>]) -> Result<f64, TaskExecutionError> {
    let points: Vec<(f64, f64)> = ring
        .iter()
        .map(|p| match p.as_slice() {
            [lon, lat, ..] => Ok((lon.to_radians(), lat.to_radians())),
            _ => Err(TaskExecutionError::InvalidInput(
                "position needs at least two coordinates".into(),
            )),
        })
        .collect::<Result<_, _>>()?;

    let n = points.len();
    if n <= 2 {
        return Ok(0.0);
    }

    let mut total = 0.0;
    for i in 0..n {
        let lower = points[i];
        let middle = points[(i + 1) % n];
        let upper = points[(i + 2) % n];
        total += (upper.0 - lower.0) * middle.1.sin();
    }

    Ok(total * EARTH_RADIUS_M * EARTH_RADIUS_M / 2.0)
}
