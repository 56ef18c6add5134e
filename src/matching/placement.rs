use serde::Serialize;

use crate::error::MatchError;
use crate::model::BoundingBox;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Offsets {
    pub dx: f64,
    pub dy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Anchor {
    pub x: f64,
    pub y: f64,
}

/// Parses the `[x0, y0, x1, y1]` bbox attribute written by pdfminer-style
/// text layer dumps.
pub fn parse_bounding_box(raw: &str) -> Result<BoundingBox, MatchError> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| MatchError::malformed_bbox(raw, "expected [x0, y0, x1, y1]"))?;

    let fields: Vec<&str> = inner.split(',').map(str::trim).collect();
    if fields.len() != 4 {
        return Err(MatchError::malformed_bbox(
            raw,
            format!("expected 4 coordinates, found {}", fields.len()),
        ));
    }

    let mut coords = [0.0_f64; 4];
    for (slot, field) in coords.iter_mut().zip(&fields) {
        let value = field
            .parse::<f64>()
            .map_err(|_| MatchError::malformed_bbox(raw, format!("invalid coordinate {field:?}")))?;
        if !value.is_finite() {
            return Err(MatchError::malformed_bbox(
                raw,
                format!("non-finite coordinate {field:?}"),
            ));
        }
        *slot = value;
    }

    let [x0, y0, x1, y1] = coords;
    Ok(BoundingBox { x0, y0, x1, y1 })
}

pub fn anchor_for(bbox: &BoundingBox, offsets: Offsets) -> Anchor {
    Anchor {
        x: bbox.x0 + offsets.dx,
        y: bbox.y0 + offsets.dy,
    }
}
