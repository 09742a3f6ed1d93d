use thiserror::Error;

/// Placeholder name substituted with the chunk text
pub const CHUNK_PLACEHOLDER: &str = "chunk";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PromptError {
    #[error("unknown placeholder {{{0}}} in prompt template")]
    UnknownPlaceholder(String),

    #[error("unmatched '{0}' at byte {1} in prompt template")]
    UnmatchedBrace(char, usize),
}

/// Render a prompt template by substituting `{chunk}` with the chunk text.
///
/// Templates follow format-string conventions: `{{` and `}}` are literal
/// braces, so JSON examples in a template must be written with doubled braces.
pub fn render_prompt(template: &str, chunk_text: &str) -> Result<String, PromptError> {
    let mut rendered = String::with_capacity(template.len() + chunk_text.len());
    let mut chars = template.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' => {
                if chars.next_if(|&(_, next)| next == '{').is_some() {
                    rendered.push('{');
                    continue;
                }

                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some((_, '}')) => break,
                        Some((_, '{')) | None => return Err(PromptError::UnmatchedBrace('{', pos)),
                        Some((_, ch)) => name.push(ch),
                    }
                }

                if name == CHUNK_PLACEHOLDER {
                    rendered.push_str(chunk_text);
                } else {
                    return Err(PromptError::UnknownPlaceholder(name));
                }
            }
            '}' => {
                if chars.next_if(|&(_, next)| next == '}').is_some() {
                    rendered.push('}');
                } else {
                    return Err(PromptError::UnmatchedBrace('}', pos));
                }
            }
            _ => rendered.push(c),
        }
    }

    Ok(rendered)
}
