use std::fmt;

/// CLI-level error carrying the process exit code
#[derive(Debug)]
pub enum BugsightError {
    /// Page could not be loaded (exit code 2)
    Navigation(String),
    /// WebDriver unavailable or session failed (exit code 4)
    WebDriverFailed(String),
    /// Operation timeout (exit code 5)
    Timeout(String),
    /// LLM endpoint unusable (exit code 6)
    Llm(String),
    /// Anything else (exit code 1)
    Other(anyhow::Error),
}

impl BugsightError {
    pub fn exit_code(&self) -> i32 {
        match self {
            BugsightError::Navigation(_) => 2,
            BugsightError::WebDriverFailed(_) => 4,
            BugsightError::Timeout(_) => 5,
            BugsightError::Llm(_) => 6,
            BugsightError::Other(_) => 1,
        }
    }
}

impl fmt::Display for BugsightError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Already reads "Navigation to <url> failed: ..."
            BugsightError::Navigation(msg) => f.write_str(msg),
            BugsightError::WebDriverFailed(msg) => {
                write!(f, "WebDriver connection failed: {}", msg)
            }
            BugsightError::Timeout(msg) => write!(f, "Operation timed out: {}", msg),
            BugsightError::Llm(msg) => write!(f, "LLM request failed: {}", msg),
            BugsightError::Other(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for BugsightError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BugsightError::Other(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for BugsightError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(llm) = err.downcast_ref::<crate::llm::LlmError>() {
            return BugsightError::Llm(llm.to_string());
        }

        // Classify by the full context chain
        let msg = format!("{:#}", err);
        if msg.contains("Navigation to") {
            BugsightError::Navigation(msg)
        } else if msg.contains("WebDriver")
            || msg.contains("geckodriver")
            || msg.contains("chromedriver")
        {
            BugsightError::WebDriverFailed(msg)
        } else if msg.contains("Timeout") || msg.contains("timed out") {
            BugsightError::Timeout(msg)
        } else {
            BugsightError::Other(err)
        }
    }
}
