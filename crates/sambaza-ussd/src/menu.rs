use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the entry screen every menu must define.
pub const ROOT_SCREEN: &str = "root";

const SCREEN_TARGET_PREFIX: &str = "screen:";
const END_TARGET_PREFIX: &str = "end:";

/// Errors from parsing or validating a menu definition.
#[derive(Debug, thiserror::Error)]
pub enum MenuError {
    #[error("Menu: invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Menu: missing required '{ROOT_SCREEN}' screen")]
    MissingRoot,

    #[error("Menu: screen '{screen}' option '{option}' has malformed target '{target}' (expected 'screen:<name>' or 'end:<text>')")]
    BadTarget {
        screen: String,
        option: String,
        target: String,
    },

    #[error("Menu: screen '{screen}' option '{option}' points to unknown screen '{target}'")]
    UnknownScreen {
        screen: String,
        option: String,
        target: String,
    },
}

/// One menu screen: the prompt shown to the subscriber plus digit-keyed
/// routing. The prompt text is authored with the option list included —
/// the options map only routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Screen {
    pub text: String,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

/// A validated USSD menu tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UssdMenu {
    pub screens: BTreeMap<String, Screen>,
}

/// What to answer the gateway with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UssdReply {
    /// `CON` — session continues, more input expected.
    Continue(String),
    /// `END` — terminal message, gateway closes the session.
    End(String),
}

impl UssdReply {
    /// The `text/plain` body the gateway expects.
    pub fn render(&self) -> String {
        match self {
            UssdReply::Continue(text) => format!("CON {text}"),
            UssdReply::End(text) => format!("END {text}"),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, UssdReply::End(_))
    }
}

/// Outcome of walking the cumulative input string.
#[derive(Debug, Clone)]
pub struct Traversal {
    /// Screen the subscriber ended up on (last screen before an `end:` hit).
    pub screen: String,
    /// The option tokens actually consumed, in order.
    pub path: Vec<String>,
    pub reply: UssdReply,
}

impl UssdMenu {
    /// Parse and validate a menu definition.
    pub fn from_json(raw: &str) -> Result<Self, MenuError> {
        let menu: UssdMenu = serde_json::from_str(raw)?;
        menu.validate()?;
        Ok(menu)
    }

    fn validate(&self) -> Result<(), MenuError> {
        if !self.screens.contains_key(ROOT_SCREEN) {
            return Err(MenuError::MissingRoot);
        }
        for (name, screen) in &self.screens {
            for (option, target) in &screen.options {
                if let Some(next) = target.strip_prefix(SCREEN_TARGET_PREFIX) {
                    if !self.screens.contains_key(next) {
                        return Err(MenuError::UnknownScreen {
                            screen: name.clone(),
                            option: option.clone(),
                            target: next.to_string(),
                        });
                    }
                } else if !target.starts_with(END_TARGET_PREFIX) {
                    return Err(MenuError::BadTarget {
                        screen: name.clone(),
                        option: option.clone(),
                        target: target.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn screen(&self, name: &str) -> &Screen {
        // Validation guarantees every referenced screen exists.
        &self.screens[name]
    }

    /// Walk the cumulative gateway input (`""`, `"1"`, `"1*2"`, ...).
    ///
    /// Unknown option tokens replay the current screen with an
    /// "Invalid choice." line; tokens after a terminal hit are ignored.
    /// Traversal is bounded by the token count, so cyclic menus are fine.
    pub fn traverse(&self, text: &str) -> Traversal {
        let mut current = ROOT_SCREEN.to_string();
        let mut path = Vec::new();

        for token in text.split('*').filter(|t| !t.is_empty()) {
            let target = match self.screen(&current).options.get(token) {
                Some(t) => t.clone(),
                None => {
                    let prompt = format!("Invalid choice.\n{}", self.screen(&current).text);
                    return Traversal {
                        screen: current,
                        path,
                        reply: UssdReply::Continue(prompt),
                    };
                }
            };
            path.push(token.to_string());

            if let Some(next) = target.strip_prefix(SCREEN_TARGET_PREFIX) {
                current = next.to_string();
            } else if let Some(end_text) = target.strip_prefix(END_TARGET_PREFIX) {
                return Traversal {
                    screen: current,
                    path,
                    reply: UssdReply::End(end_text.to_string()),
                };
            }
        }

        let prompt = self.screen(&current).text.clone();
        Traversal {
            screen: current,
            path,
            reply: UssdReply::Continue(prompt),
        }
    }
}
