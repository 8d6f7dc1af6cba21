pub mod queue_shields;
pub mod validate_shields;
