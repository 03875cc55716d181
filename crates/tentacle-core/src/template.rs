//! Command template rendering: substitutes `{host}`, `{port}`, `{path}` and
//! `{branch}` placeholders into build/start command strings.
//!
//! Unknown placeholders are a hard error raised before any process is
//! spawned (§9 design notes: "preserve that behavior").

use crate::error::TentacleError;

/// The placeholder values available to a rendered command.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub branch: String,
}

impl CommandContext {
    fn value_for(&self, placeholder: &str) -> Option<String> {
        match placeholder {
            "host" => Some(self.host.clone()),
            "port" => Some(self.port.to_string()),
            "path" => Some(self.path.clone()),
            "branch" => Some(self.branch.clone()),
            _ => None,
        }
    }
}

/// Render a single template string against a `CommandContext`.
///
/// Scans for `{...}` spans and replaces each with its context value, failing
/// on the first placeholder name that isn't one of the four recognized
/// keys. A literal `{{` or `}}` is not supported — this format uses bare
/// single braces, matching the four-placeholder grammar described in §3.
pub fn render(template: &str, ctx: &CommandContext) -> Result<String, TentacleError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c != '{' {
            out.push(c);
            continue;
        }

        let close = template[i..]
            .find('}')
            .map(|rel| i + rel)
            .ok_or_else(|| TentacleError::CommandRender {
                placeholder: "<unterminated>".to_string(),
                template: template.to_string(),
            })?;

        let placeholder = &template[i + 1..close];
        match ctx.value_for(placeholder) {
            Some(value) => out.push_str(&value),
            None => {
                return Err(TentacleError::CommandRender {
                    placeholder: placeholder.to_string(),
                    template: template.to_string(),
                })
            }
        }

        // Skip the chars we just consumed as part of the placeholder span.
        while let Some(&(j, _)) = chars.peek() {
            if j <= close {
                chars.next();
            } else {
                break;
            }
        }
    }

    Ok(out)
}

/// Render every template in `templates`, skipping blank ones, per §4.3's
/// "skipping empty templates" rule for the build pipeline.
pub fn render_all(
    templates: &[String],
    ctx: &CommandContext,
) -> Result<Vec<String>, TentacleError> {
    templates
        .iter()
        .filter(|t| !t.trim().is_empty())
        .map(|t| render(t, ctx))
        .collect()
}
