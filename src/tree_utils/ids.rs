use uuid::Uuid;

/// Source of node and block identifiers. Ids only need to be unique within a session.
pub trait IdSource {
    fn new_id(&mut self) -> String;
}

// Time-ordered uuids for the running app
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIds;

impl IdSource for UuidIds {
    fn new_id(&mut self) -> String {
        Uuid::now_v7().simple().to_string()
    }
}

// Deterministic ids (test-id-1, test-id-2, ...) for tests and fixtures
#[derive(Debug, Default, Clone)]
pub struct SequentialIds {
    counter: u64,
}

impl SequentialIds {
    pub fn new() -> Self { Self::default() }
}

impl IdSource for SequentialIds {
    fn new_id(&mut self) -> String {
        self.counter += 1;
        format!("test-id-{}", self.counter)
    }
}
