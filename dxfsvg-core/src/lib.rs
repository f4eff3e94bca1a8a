pub mod arc;
pub mod collection;
pub mod colour;
pub mod context;
pub mod element;
pub mod ellipse;
pub mod format;
pub mod geometry;
pub mod hatch;
pub mod locality;
pub mod pattern;
pub mod polyline;
pub mod style;
pub mod text;

pub mod errors {
    use thiserror::Error;

    use crate::hatch::HatchState;

    /// 几何层错误。`NullPoint` 属于调用方契约错误，其余为输入数据错误。
    #[derive(Debug, Error, Clone, PartialEq)]
    pub enum GeometryError {
        #[error("null point passed to `{operation}`")]
        NullPoint { operation: &'static str },
        #[error("illegal sweep flag value {0} (expected 0 or 1)")]
        IllegalSweepFlag(i32),
        #[error("degenerate geometry: {0}")]
        DegenerateGeometry(String),
    }

    /// 填充图案状态机错误：只中止当前 HATCH，不影响整个转换。
    #[derive(Debug, Error, Clone, PartialEq)]
    pub enum HatchError {
        #[error("undefined hatch state {value} (last valid state: {last_state:?})")]
        UndefinedState { value: i32, last_state: HatchState },
        #[error("undefined hatch edge type {0}")]
        UndefinedEdge(i32),
        #[error("hatch edge data arrived in state {state:?} before any boundary loop was started")]
        NoActiveBoundary { state: HatchState },
        #[error("hatch {kind} edge is missing {missing}")]
        IncompleteEdge {
            kind: &'static str,
            missing: &'static str,
        },
        #[error("hatch pattern line is incomplete: {0}")]
        IncompletePatternLine(String),
        #[error("hatch pattern declares {declared} lines but more were given")]
        ExtraPatternLine { declared: usize },
        #[error(transparent)]
        Geometry(#[from] GeometryError),
    }
}

pub use context::{ConversionContext, ConversionSettings, DrawingSpace, Limits, SpaceConverter};
pub use element::{Renderable, SvgElement};
pub use geometry::{Point, PointFormat, Relationship};
pub use locality::{DoubleEnded, share_endpoint};
