//! Built-in backend presets for OpenAI-compatible inference services.
//!
//! Each preset defines the base URL and the default environment variable for
//! the API key. Users name a backend in their config and the preset fills in
//! the details; an explicit `base_url` always wins.

#[derive(Debug, Clone)]
pub struct BackendPreset {
    pub name: &'static str,
    pub base_url: &'static str,
    pub default_api_key_env: &'static str,
    /// Streams reasoning in a separate `reasoning_content` field.
    pub emits_reasoning: bool,
}

const PRESETS: &[BackendPreset] = &[
    BackendPreset {
        name: "nvidia",
        base_url: "https://integrate.api.nvidia.com/v1",
        default_api_key_env: "NIM_API_KEY",
        emits_reasoning: true,
    },
    BackendPreset {
        name: "deepseek",
        base_url: "https://api.deepseek.com/v1",
        default_api_key_env: "DEEPSEEK_API_KEY",
        emits_reasoning: true,
    },
    BackendPreset {
        name: "openrouter",
        base_url: "https://openrouter.ai/api/v1",
        default_api_key_env: "OPENROUTER_API_KEY",
        emits_reasoning: true,
    },
    BackendPreset {
        name: "fireworks",
        base_url: "https://api.fireworks.ai/inference/v1",
        default_api_key_env: "FIREWORKS_API_KEY",
        emits_reasoning: true,
    },
    BackendPreset {
        name: "together",
        base_url: "https://api.together.xyz/v1",
        default_api_key_env: "TOGETHER_API_KEY",
        emits_reasoning: false,
    },
    BackendPreset {
        name: "groq",
        base_url: "https://api.groq.com/openai/v1",
        default_api_key_env: "GROQ_API_KEY",
        emits_reasoning: false,
    },
    BackendPreset {
        name: "openai",
        base_url: "https://api.openai.com/v1",
        default_api_key_env: "OPENAI_API_KEY",
        emits_reasoning: false,
    },
];

impl BackendPreset {
    #[must_use]
    pub fn from_name(name: &str) -> Option<&'static BackendPreset> {
        let name = name.to_lowercase();
        PRESETS.iter().find(|p| p.name == name)
    }

    #[must_use]
    pub fn all() -> &'static [BackendPreset] {
        PRESETS
    }

    /// Comma-separated preset names for error messages.
    #[must_use]
    pub fn known_names() -> String {
        PRESETS.iter().map(|p| p.name).collect::<Vec<_>>().join(", ")
    }
}
