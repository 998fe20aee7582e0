/// Represents ways to locate a control inside a window
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// Select by role and optional name
    Role { role: String, name: Option<String> },
    /// Select by name/label
    Name(String),
    /// Select by class name
    ClassName(String),
    /// Select by native automation id (`AutomationId` on Windows)
    NativeId(String),
    /// Chain multiple selectors, each searched within the previous match
    Chain(Vec<Selector>),
    /// Represents an invalid selector string, with a reason.
    Invalid(String),
}

impl Selector {
    /// Shorthand for `role:button|name:<title>`, the shape installer wizards use.
    pub fn button(title: impl Into<String>) -> Self {
        Selector::Role {
            role: "button".to_string(),
            name: Some(title.into()),
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            Selector::Invalid(_) => false,
            Selector::Chain(parts) => !parts.is_empty() && parts.iter().all(Selector::is_valid),
            _ => true,
        }
    }
}

/// Whether a control's accessible name satisfies the name a selector asks for.
///
/// Case-insensitive substring match with `&` mnemonic markers dropped, so
/// "Next" finds "&Next" and "Next >".
pub fn name_matches(wanted: &str, actual: &str) -> bool {
    let actual = actual.replace('&', "").to_lowercase();
    actual.contains(&wanted.replace('&', "").to_lowercase())
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selector::Role { role, name: Some(name) } => write!(f, "{role}|{name}"),
            Selector::Role { role, name: None } => write!(f, "role:{role}"),
            Selector::Name(name) => write!(f, "name:{name}"),
            Selector::ClassName(class) => write!(f, "classname:{class}"),
            Selector::NativeId(id) => write!(f, "nativeid:{id}"),
            Selector::Chain(parts) => {
                let parts: Vec<String> = parts.iter().map(ToString::to_string).collect();
                write!(f, "{}", parts.join(" >> "))
            }
            Selector::Invalid(reason) => write!(f, "<invalid: {reason}>"),
        }
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        let s = s.trim();

        // Handle chained selectors first
        let parts: Vec<&str> = s.split(">>").map(|p| p.trim()).collect();
        if parts.len() > 1 {
            return Selector::Chain(parts.into_iter().map(Selector::from).collect());
        }

        // if using pipe, use it for the role plus name (preferred precise format)
        if let Some((role_part, name_part)) = s.split_once('|') {
            let role_part = role_part.trim();
            let name_part = name_part.trim();
            let role = role_part.strip_prefix("role:").unwrap_or(role_part);
            let name = name_part.strip_prefix("name:").unwrap_or(name_part);
            if role.is_empty() || name.is_empty() {
                return Selector::Invalid(format!("Empty role or name in \"{s}\""));
            }
            return Selector::Role {
                role: role.to_string(),
                name: Some(name.to_string()),
            };
        }

        let lower = s.to_lowercase();
        match s {
            "" => Selector::Invalid("Empty selector".to_string()),
            _ if s.starts_with("role:") => Selector::Role {
                role: s[5..].to_string(),
                name: None,
            },
            "window" | "dialog" | "button" | "checkbox" | "edit" | "text" | "pane" => {
                Selector::Role {
                    role: s.to_string(),
                    name: None,
                }
            }
            _ if lower.starts_with("name:") => Selector::Name(s[5..].to_string()),
            _ if lower.starts_with("classname:") => Selector::ClassName(s[10..].to_string()),
            _ if lower.starts_with("nativeid:") => Selector::NativeId(s[9..].trim().to_string()),
            _ if s.contains(':') => {
                let (role, name) = s.split_once(':').unwrap_or((s, ""));
                Selector::Role {
                    role: role.to_string(),
                    name: Some(name.to_string()),
                }
            }
            _ => Selector::Invalid(format!(
                "Unknown selector format: \"{s}\". Use 'role|name' or prefixes like 'role:', 'name:', 'classname:' or 'nativeid:'."
            )),
        }
    }
}

impl From<String> for Selector {
    fn from(s: String) -> Self {
        Selector::from(s.as_str())
    }
}
