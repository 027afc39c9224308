use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

const BUILTIN_GREETING: &str = "Hi ";
const BUILTIN_SIGN_OFF: &str = "Best regards,";

/// How a participant likes to be addressed. Read from
/// `preferences.tone` in their calendar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Professional,
    Formal,
    Casual,
    Friendly,
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tone::Professional => "professional",
            Tone::Formal => "formal",
            Tone::Casual => "casual",
            Tone::Friendly => "friendly",
        };
        f.write_str(s)
    }
}

impl FromStr for Tone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "professional" => Ok(Tone::Professional),
            "formal" => Ok(Tone::Formal),
            "casual" => Ok(Tone::Casual),
            "friendly" => Ok(Tone::Friendly),
            other => Err(format!(
                "unknown tone '{}'; expected professional, formal, casual or friendly",
                other
            )),
        }
    }
}

impl Tone {
    fn greeting(self, name: &str) -> String {
        match self {
            Tone::Professional => format!("Hi {},", name),
            Tone::Formal => format!("Dear {},", name),
            Tone::Casual => format!("Hey {},", name),
            Tone::Friendly => format!("Hi {}!", name),
        }
    }

    fn sign_off(self) -> &'static str {
        match self {
            Tone::Professional => BUILTIN_SIGN_OFF,
            Tone::Formal => "Kind regards,",
            Tone::Casual => "Cheers,",
            Tone::Friendly => "All the best,",
        }
    }

    /// Swaps the greeting and sign-off lines of a body written in the
    /// built-in `Hi <name>,` ... `Best regards,` shape. Other bodies are
    /// returned unchanged.
    pub fn restyle(self, body: &str) -> String {
        if self == Tone::Professional {
            return body.to_string();
        }

        let (first, rest) = match body.split_once('\n') {
            Some((first, rest)) => (first, Some(rest)),
            None => (body, None),
        };
        let first = match first
            .strip_prefix(BUILTIN_GREETING)
            .and_then(|line| line.strip_suffix(','))
        {
            Some(name) => self.greeting(name),
            None => first.to_string(),
        };

        match rest {
            Some(rest) => {
                let rest = rest
                    .lines()
                    .map(|line| if line == BUILTIN_SIGN_OFF { self.sign_off() } else { line })
                    .collect::<Vec<_>>()
                    .join("\n");
                let trailing = if body.ends_with('\n') { "\n" } else { "" };
                format!("{}\n{}{}", first, rest, trailing)
            }
            None => first,
        }
    }
}
