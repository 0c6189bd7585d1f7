pub mod doctor;
pub mod probe;
pub mod reframe;
