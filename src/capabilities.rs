//! DDC/CI capability string parsing.
//!
//! The capability string is a nested-parenthesis `key(value)` grammar,
//! e.g. `(type(lcd)model(SyncMaster)vcp(10 12(1 2) 14))`.  The `vcp`
//! value is a space-separated list of hex feature IDs, each optionally
//! followed by its own parenthesized list of permitted decimal values.
//! Splitting must track parenthesis depth so nested groups survive.

use crate::error::ProbeError;

/// One VCP feature advertised by the display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VcpControl {
    /// 8-bit feature index, e.g. 0x10 = brightness.
    pub id: u8,
    /// Permitted discrete values; empty means any value is accepted.
    pub allowed: Vec<u16>,
}

impl VcpControl {
    /// Whether `value` is acceptable for this control.
    pub fn permits(&self, value: u16) -> bool {
        self.allowed.is_empty() || self.allowed.contains(&value)
    }
}

/// Display technology advertised in the capability string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayKind {
    Lcd,
    Crt,
}

/// Everything we extract from a capability string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Capabilities {
    pub kind: Option<DisplayKind>,
    pub model: Option<String>,
    pub controls: Vec<VcpControl>,
}

impl Capabilities {
    /// Look up a control by feature index.
    pub fn control(&self, id: u8) -> Option<&VcpControl> {
        self.controls.iter().find(|c| c.id == id)
    }
}

/// Parse a full capability string.
///
/// Unknown top-level keys (`prot`, `cmds`, `mccs_ver`, ...) are skipped;
/// unbalanced parentheses are an error.
pub fn parse_capabilities(input: &str) -> Result<Capabilities, ProbeError> {
    let trimmed = input.trim().trim_matches('\0').trim();

    // The whole string is usually wrapped in one outer pair
    let body = if trimmed.starts_with('(') {
        inner_group(trimmed)?
    } else {
        trimmed
    };

    let mut caps = Capabilities::default();
    let mut rest = body;
    while let Some((key, value, tail)) = next_pair(rest)? {
        match key {
            "type" => {
                caps.kind = match value.trim() {
                    "lcd" => Some(DisplayKind::Lcd),
                    "crt" => Some(DisplayKind::Crt),
                    _ => None,
                };
            }
            "model" => caps.model = Some(value.trim().to_string()),
            "vcp" => caps.controls = parse_vcp_list(value)?,
            _ => {}
        }
        rest = tail;
    }

    Ok(caps)
}

/// Strip one balanced outer parenthesis pair, returning the inside.
fn inner_group(s: &str) -> Result<&str, ProbeError> {
    let mut depth = 0i32;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    if !s[i + 1..].trim().is_empty() {
                        // Trailing junk after the outer group; treat the
                        // whole thing as the body instead
                        return Ok(s);
                    }
                    return Ok(&s[1..i]);
                }
            }
            _ => {}
        }
    }
    Err(ProbeError::CapabilityParse(format!(
        "unbalanced parentheses in {s:?}"
    )))
}

/// Pull the next `key(value)` pair off the front of `s`.
///
/// Returns `(key, value, remainder)`, or `None` when only whitespace is
/// left.
fn next_pair(s: &str) -> Result<Option<(&str, &str, &str)>, ProbeError> {
    let s = s.trim_start();
    if s.is_empty() {
        return Ok(None);
    }

    let open = s.find('(').ok_or_else(|| {
        ProbeError::CapabilityParse(format!("expected key(value), got {s:?}"))
    })?;
    let key = s[..open].trim();
    if key.is_empty() {
        return Err(ProbeError::CapabilityParse(format!(
            "empty key before parenthesis in {s:?}"
        )));
    }

    let mut depth = 0i32;
    for (i, c) in s[open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    let value = &s[open + 1..open + i];
                    let tail = &s[open + i + 1..];
                    return Ok(Some((key, value, tail)));
                }
            }
            _ => {}
        }
    }

    Err(ProbeError::CapabilityParse(format!(
        "unterminated value for key {key:?}"
    )))
}

/// Parse the `vcp(...)` body: hex feature IDs, each with an optional
/// parenthesized decimal value list.
fn parse_vcp_list(s: &str) -> Result<Vec<VcpControl>, ProbeError> {
    let mut controls = Vec::new();
    let mut rest = s.trim();

    while !rest.is_empty() {
        // Hex ID token
        let end = rest
            .find(|c: char| !c.is_ascii_hexdigit())
            .unwrap_or(rest.len());
        if end == 0 {
            return Err(ProbeError::CapabilityParse(format!(
                "expected hex VCP id, got {rest:?}"
            )));
        }
        let id = u8::from_str_radix(&rest[..end], 16).map_err(|_| {
            ProbeError::CapabilityParse(format!("bad VCP id {:?}", &rest[..end]))
        })?;
        rest = rest[end..].trim_start();

        // Optional permitted-value group
        let mut allowed = Vec::new();
        if rest.starts_with('(') {
            let mut depth = 0i32;
            let mut close = None;
            for (i, c) in rest.char_indices() {
                match c {
                    '(' => depth += 1,
                    ')' => {
                        depth -= 1;
                        if depth == 0 {
                            close = Some(i);
                            break;
                        }
                    }
                    _ => {}
                }
            }
            let close = close.ok_or_else(|| {
                ProbeError::CapabilityParse(format!(
                    "unterminated value list for VCP 0x{id:02x}"
                ))
            })?;
            for token in rest[1..close].split_whitespace() {
                let value = token.parse::<u16>().map_err(|_| {
                    ProbeError::CapabilityParse(format!(
                        "bad permitted value {token:?} for VCP 0x{id:02x}"
                    ))
                })?;
                allowed.push(value);
            }
            rest = rest[close + 1..].trim_start();
        }

        controls.push(VcpControl { id, allowed });
    }

    Ok(controls)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
