//! The parts of a container the NUMA filter looks at

/// Container as seen by a lifecycle hook
#[derive(Debug, Clone, Default)]
pub struct Container {
    /// Container ID
    pub id: String,
    /// Environment in `KEY=VALUE` form
    pub env: Vec<String>,
    /// Current memory node constraint (`cpuset.mems` syntax), if any
    pub mems: Option<String>,
}

impl Container {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Set an environment variable
    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.push(format!("{}={}", key, value));
        self
    }

    /// Set the memory node constraint
    pub fn with_mems(mut self, mems: &str) -> Self {
        self.mems = Some(mems.to_string());
        self
    }

    /// Value of the first `key=` entry in the environment
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env.iter().find_map(|entry| {
            entry
                .strip_prefix(key)
                .and_then(|rest| rest.strip_prefix('='))
        })
    }
}
