use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingDevice {
    Auto,
    Cpu,
    Cuda,
    Metal,
}

impl std::str::FromStr for TrainingDevice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "metal" => Ok(Self::Metal),
            other => Err(format!("unknown device '{other}'")),
        }
    }
}

/// Execution handle shared by the model and the data source of one run.
///
/// Backends receive it at construction time instead of reaching for ambient
/// session state, so the control loop never touches a compute backend directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    pub device: TrainingDevice,
    pub run_id: String,
}

impl ExecutionContext {
    #[must_use]
    pub fn new(device: TrainingDevice, run_id: impl Into<String>) -> Self {
        Self { device, run_id: run_id.into() }
    }

    /// A CPU context, used by tests and the baseline backends.
    #[must_use]
    pub fn cpu() -> Self {
        Self::new(TrainingDevice::Cpu, "")
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new(TrainingDevice::Auto, "")
    }
}
