use uuid::Uuid;

/// Source of event ids for requests that arrive without one
pub trait EventIdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Random v4 UUIDs in simple form (32 lowercase hex digits, no hyphens)
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidEventIdGenerator;

impl EventIdGenerator for UuidEventIdGenerator {
    fn generate(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }
}
