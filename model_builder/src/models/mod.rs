//! Data model for alignment points and the coordinate values they carry.

pub mod coordinates;
pub mod point;
pub mod time;

pub use coordinates::{
    wrap_hours_signed, CoordinateOffset, EquatorialCoordinates, HorizontalCoordinates, PierSide,
};
pub use point::{CaptureRecord, ModelPoint, ModelPointState, UNASSIGNED_MODEL_INDEX};
pub use time::ModifiedJulianDate;
