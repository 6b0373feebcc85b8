// src/core/html.rs
//
// Narrow, purpose-built markup slicing. The portal's HTML is treated as a
// semi-structured text format: we look for known tags, ids and attribute
// substrings, never build a DOM.

use super::sanitize::{normalize_entities, normalize_ws};

pub fn to_lower(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii() { c.to_ascii_lowercase() } else { c })
        .collect()
}

/// Span of the next `<tag …>` open tag at or after `from`, including the
/// closing `>`. Tag-name boundary is enforced ("<a" will not match "<abbr").
pub fn find_open_tag_ci(s: &str, tag: &str, from: usize) -> Option<(usize, usize)> {
    let lc = to_lower(s);
    let pat = format!("<{}", to_lower(tag));
    let mut pos = from;
    loop {
        let start = lc.get(pos..)?.find(&pat)? + pos;
        let after = start + pat.len();
        let boundary = match lc.as_bytes().get(after) {
            None => false,
            Some(b) => !b.is_ascii_alphanumeric(),
        };
        if boundary {
            let end = s[after..].find('>')? + after + 1;
            return Some((start, end));
        }
        pos = after;
    }
}

/// All `<tag …>` open-tag spans in `s`, in document order.
pub fn open_tags_ci(s: &str, tag: &str) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut pos = 0usize;
    while let Some((a, b)) = find_open_tag_ci(s, tag, pos) {
        out.push((a, b));
        pos = b;
    }
    out
}

/// Span of the next `<tag …> … </tag>` block at or after `from`.
/// Naive: pairs the open tag with the first close tag, which is what the
/// portal's flat tables and forms need.
pub fn tag_block_ci(s: &str, tag: &str, from: usize) -> Option<(usize, usize)> {
    let (start, open_end) = find_open_tag_ci(s, tag, from)?;
    let close = format!("</{}", to_lower(tag));
    let lc = to_lower(s);
    let rel = lc[open_end..].find(&close)?;
    let close_start = open_end + rel;
    let end = s[close_start..].find('>')? + close_start + 1;
    Some((start, end))
}

/// Inner content of a block returned by [`tag_block_ci`].
pub fn inner_after_open_tag(block: &str) -> String {
    if let Some(oe) = block.find('>') {
        if let Some(cs) = block.rfind('<') {
            if cs > oe {
                return block[oe + 1..cs].to_string();
            }
        }
    }
    s!()
}

/// Attributes of a single open tag, names lowercased, values entity-decoded.
/// Bare attributes (`checked`, `selected`) map to an empty value.
pub fn parse_attrs(open_tag: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let bytes = open_tag.as_bytes();
    let mut i = 0usize;

    // skip "<" and the tag name
    while i < bytes.len() && bytes[i] != b'<' { i += 1; }
    i += 1;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'/' || bytes[i] == b'!') {
        i += 1;
    }

    while i < bytes.len() {
        while i < bytes.len() && (bytes[i].is_ascii_whitespace() || bytes[i] == b'/') { i += 1; }
        if i >= bytes.len() || bytes[i] == b'>' { break; }

        let name_start = i;
        while i < bytes.len() && !bytes[i].is_ascii_whitespace()
            && bytes[i] != b'=' && bytes[i] != b'>' && bytes[i] != b'/'
        {
            i += 1;
        }
        let name = to_lower(&open_tag[name_start..i]);
        if name.is_empty() { break; }

        while i < bytes.len() && bytes[i].is_ascii_whitespace() { i += 1; }

        let mut value = s!();
        if i < bytes.len() && bytes[i] == b'=' {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() { i += 1; }
            if i < bytes.len() && (bytes[i] == b'"' || bytes[i] == b'\'') {
                let quote = bytes[i];
                i += 1;
                let v_start = i;
                while i < bytes.len() && bytes[i] != quote { i += 1; }
                value = open_tag[v_start..i].to_string();
                i += 1;
            } else {
                let v_start = i;
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                    i += 1;
                }
                value = open_tag[v_start..i].to_string();
            }
        }
        out.push((name, normalize_entities(&value)));
    }
    out
}

/// Value of `name` on the given open tag, if present.
pub fn attr_ci(open_tag: &str, name: &str) -> Option<String> {
    let wanted = to_lower(name);
    parse_attrs(open_tag)
        .into_iter()
        .find(|(n, _)| *n == wanted)
        .map(|(_, v)| v)
}

/// Whether the open tag carries `name` at all (with or without a value).
pub fn has_attr_ci(open_tag: &str, name: &str) -> bool {
    let wanted = to_lower(name);
    parse_attrs(open_tag).iter().any(|(n, _)| *n == wanted)
}

/// Open tag of the first `tag` element whose `attr` equals `value`.
pub fn find_open_tag_by_attr_ci<'a>(
    s: &'a str,
    tag: &str,
    attr: &str,
    value: &str,
) -> Option<&'a str> {
    let mut pos = 0usize;
    while let Some((a, b)) = find_open_tag_ci(s, tag, pos) {
        let open = &s[a..b];
        if attr_ci(open, attr).as_deref() == Some(value) {
            return Some(open);
        }
        pos = b;
    }
    None
}

/// Full `<tag …>…</tag>` block of the first element whose `attr` equals `value`.
pub fn find_block_by_attr_ci<'a>(
    s: &'a str,
    tag: &str,
    attr: &str,
    value: &str,
) -> Option<&'a str> {
    let mut pos = 0usize;
    while let Some((a, b)) = find_open_tag_ci(s, tag, pos) {
        if attr_ci(&s[a..b], attr).as_deref() == Some(value) {
            let close = format!("</{}", to_lower(tag));
            let lc = to_lower(s);
            let rel = lc[b..].find(&close)?;
            let close_start = b + rel;
            let end = s[close_start..].find('>')? + close_start + 1;
            return Some(&s[a..end]);
        }
        pos = b;
    }
    None
}

/// First `href` inside a fragment, if any anchor carries one.
pub fn first_link_href(fragment: &str) -> Option<String> {
    let mut pos = 0usize;
    while let Some((a, b)) = find_open_tag_ci(fragment, "a", pos) {
        if let Some(href) = attr_ci(&fragment[a..b], "href") {
            if !href.is_empty() {
                return Some(href);
            }
        }
        pos = b;
    }
    None
}

pub fn strip_tags<S: AsRef<str>>(s: S) -> String {
    let s = s.as_ref();

    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;

    for ch in s.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

/// Visible text of a fragment: tags stripped, entities expanded, whitespace
/// collapsed.
pub fn text_of<S: AsRef<str>>(fragment: S) -> String {
    normalize_ws(&normalize_entities(&strip_tags(fragment)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_tag_respects_name_boundary() {
        let html = "<abbr>x</abbr> <a href='u'>y</a>";
        let (a, b) = find_open_tag_ci(html, "a", 0).unwrap();
        assert_eq!(&html[a..b], "<a href='u'>");
    }

    #[test]
    fn attrs_parse_quoted_unquoted_and_bare() {
        let tag = r#"<input type="radio" name=grp value='1' checked>"#;
        assert_eq!(attr_ci(tag, "type").as_deref(), Some("radio"));
        assert_eq!(attr_ci(tag, "name").as_deref(), Some("grp"));
        assert_eq!(attr_ci(tag, "value").as_deref(), Some("1"));
        assert!(has_attr_ci(tag, "checked"));
        assert!(!has_attr_ci(tag, "selected"));
    }

    #[test]
    fn attr_values_are_entity_decoded() {
        let tag = r#"<a href="controlador.php?acao=x&amp;id=1">"#;
        assert_eq!(attr_ci(tag, "href").as_deref(), Some("controlador.php?acao=x&id=1"));
    }

    #[test]
    fn block_by_attr_finds_table() {
        let html = r#"<div><table id="tblA"><tr><td>1</td></tr></table></div>"#;
        let block = find_block_by_attr_ci(html, "table", "id", "tblA").unwrap();
        assert!(block.starts_with("<table"));
        assert!(block.ends_with("</table>"));
    }

    #[test]
    fn first_href_skips_anchor_without_href() {
        let frag = "<a name='n'>skip</a><a href='/x'>hit</a>";
        assert_eq!(first_link_href(frag).as_deref(), Some("/x"));
    }

    #[test]
    fn text_of_collapses_everything() {
        assert_eq!(text_of("<b>a&nbsp;&amp;</b>\n b"), "a & b");
    }
}
