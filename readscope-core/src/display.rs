use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleMode {
    Linear,
    Log,
}

impl ScaleMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScaleMode::Linear => "linear",
            ScaleMode::Log => "log",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "linear" => Some(ScaleMode::Linear),
            "log" => Some(ScaleMode::Log),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadDensity {
    Low,
    Medium,
    High,
}

impl ReadDensity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadDensity::Low => "low",
            ReadDensity::Medium => "medium",
            ReadDensity::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(ReadDensity::Low),
            "medium" => Some(ReadDensity::Medium),
            "high" => Some(ReadDensity::High),
            _ => None,
        }
    }
}

/// Snapshot of the display state persisted with a project. Passed explicitly
/// into the save path so the writer never consults application-global state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayPrefs {
    pub data_zoom: f64,
    pub scale_mode: ScaleMode,
    pub read_density: ReadDensity,
    pub gradient: String,
    pub expand_replicates: bool,
}

impl Default for DisplayPrefs {
    fn default() -> Self {
        Self {
            data_zoom: 1.0,
            scale_mode: ScaleMode::Linear,
            read_density: ReadDensity::Medium,
            gradient: "Hot Cold".to_string(),
            expand_replicates: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_strings_roundtrip() {
        for mode in [ScaleMode::Linear, ScaleMode::Log] {
            assert_eq!(ScaleMode::parse(mode.as_str()), Some(mode));
        }
        for density in [ReadDensity::Low, ReadDensity::Medium, ReadDensity::High] {
            assert_eq!(ReadDensity::parse(density.as_str()), Some(density));
        }
        assert_eq!(ScaleMode::parse("cubic"), None);
    }
}
