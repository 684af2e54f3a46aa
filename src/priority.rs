//! Query priority (§3, glossary): scheduling class bounding retry count
//! and queue position.

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    /// Maximum retry count this priority bounds (§3).
    pub fn max_retries(self) -> u32 {
        match self {
            Priority::Low => 50,
            Priority::Normal => 100,
            Priority::High => 250,
            Priority::Critical => 500,
        }
    }

    pub const ALL: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];
}
