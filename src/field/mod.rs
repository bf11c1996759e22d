pub mod motion_field;

pub use motion_field::{
    FieldGrid, FieldRejection, FieldSnapshot, FieldUpdate, MotionField, NEVER_UPDATED, VisibleCell,
};
