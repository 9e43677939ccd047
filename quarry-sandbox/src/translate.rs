//! Maps runtime error traces back to original-source positions.
//!
//! Failures here are never fatal: anything that cannot be traced degrades to
//! "no position".

use crate::runtime::v8::executor::SYNTHETIC_HEADER_LINES;
use crate::transpile::SourceMapData;
use quarry_common::Position;
use regex::Regex;
use std::sync::LazyLock;

/// V8 reports frames of code compiled by the `Function` constructor as
/// `<anonymous>:<line>:<column>`, with a 1-based line and column.
static DYNAMIC_FRAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<anonymous>:(\d+):(\d+)").expect("valid frame pattern"));

/// Translate a raw execution trace into a position in the original code.
pub fn translate(raw_trace: &str, source_map: &SourceMapData) -> Option<Position> {
    let (line, column) = dynamic_frame_location(raw_trace)?;
    let (generated_line, generated_column) = strip_synthetic_header(line, column)?;

    let map = source_map.parse()?;
    let token = map.lookup_token(generated_line, generated_column)?;
    if token.get_dst_line() != generated_line || token.get_source().is_none() {
        return None;
    }

    Some(Position {
        line: token.get_src_line() + 1,
        column: token.get_src_col(),
    })
}

/// Line and column of the first stack frame that belongs to the synthesized
/// callable, as reported by the engine.
fn dynamic_frame_location(raw_trace: &str) -> Option<(u32, u32)> {
    raw_trace
        .lines()
        .map(str::trim_start)
        .filter(|line| line.starts_with("at "))
        .find_map(|frame| {
            let captures = DYNAMIC_FRAME.captures(frame)?;
            let line = captures[1].parse().ok()?;
            let column = captures[2].parse().ok()?;
            Some((line, column))
        })
}

/// Convert an engine location inside the callable into a 0-based line and
/// column of the transpiled output. Locations inside the header are dropped.
fn strip_synthetic_header(line: u32, column: u32) -> Option<(u32, u32)> {
    let body_line = line.checked_sub(SYNTHETIC_HEADER_LINES)?;
    let generated_line = body_line.checked_sub(1)?;
    Some((generated_line, column.saturating_sub(1)))
}
