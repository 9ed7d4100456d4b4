//! Low-level HTML string helpers.
//!
//! Deliberately naive: they know just enough about markup to cut a listing
//! page into cards.  Tag and attribute matching is ASCII case-insensitive.

/// Byte range `[start, end)` of the first element opened by `open_pat`
/// at or after `from`, including its closing tag.
///
/// Nested elements with the same tag name are balanced, so a `<div>` card
/// that itself contains `<div>`s is returned whole.
pub fn element_range(s: &str, open_pat: &str, from: usize) -> Option<(usize, usize)> {
    let lc = s.to_ascii_lowercase();
    let open_lc = open_pat.to_ascii_lowercase();

    let tag = tag_name(&open_lc)?;
    let opener = format!("<{tag}");
    let closer = format!("</{tag}");

    // `<li` must not match `<link`.
    let mut search = from;
    let start = loop {
        let at = lc.get(search..)?.find(&open_lc)? + search;
        if is_tag_boundary(&lc, at + opener.len()) {
            break at;
        }
        search = at + 1;
    };

    let mut depth = 0usize;
    let mut pos = start;
    loop {
        let next_open = lc[pos..].find(&opener).map(|i| i + pos);
        let next_close = lc[pos..].find(&closer).map(|i| i + pos)?;

        match next_open {
            Some(o) if o < next_close && is_tag_boundary(&lc, o + opener.len()) => {
                depth += 1;
                pos = o + opener.len();
            }
            Some(o) if o < next_close => pos = o + opener.len(),
            _ if !is_tag_boundary(&lc, next_close + closer.len()) => {
                pos = next_close + closer.len();
            }
            _ => {
                depth = depth.checked_sub(1)?;
                let end = lc[next_close..].find('>')? + next_close + 1;
                if depth == 0 {
                    return Some((start, end));
                }
                pos = end;
            }
        }
    }
}

/// All elements matching `open_pat`, in document order.
pub fn elements<'a>(s: &'a str, open_pat: &str) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut from = 0;
    while let Some((start, end)) = element_range(s, open_pat, from) {
        out.push(&s[start..end]);
        from = end;
    }
    out
}

/// First element matching `open_pat`.
pub fn element<'a>(s: &'a str, open_pat: &str) -> Option<&'a str> {
    element_range(s, open_pat, 0).map(|(start, end)| &s[start..end])
}

/// Value of attribute `name` on the opening tag of `block`.
pub fn attr(block: &str, name: &str) -> Option<String> {
    let open_end = block.find('>')?;
    let tag = &block[..open_end];
    let lc = tag.to_ascii_lowercase();
    let needle = format!("{}=", name.to_ascii_lowercase());

    let mut from = 0;
    let at = loop {
        let i = lc[from..].find(&needle)? + from;
        // Must be a whole attribute name, not the tail of another one.
        if i > 0 && lc.as_bytes()[i - 1].is_ascii_whitespace() {
            break i + needle.len();
        }
        from = i + needle.len();
    };

    let rest = &tag[at..];
    let value = match rest.chars().next()? {
        q @ ('"' | '\'') => {
            let body = &rest[1..];
            &body[..body.find(q)?]
        }
        _ => rest
            .split(|c: char| c.is_ascii_whitespace() || c == '/')
            .next()
            .unwrap_or(""),
    };
    Some(normalize_entities(value))
}

/// Remove all tags, decode the common entities, collapse whitespace.
pub fn text(s: &str) -> String {
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
    normalize_ws(&normalize_entities(&out))
}

/// Minimal entity decoding.
pub fn normalize_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Collapse whitespace runs into one space and trim.
pub fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn tag_name(open_pat: &str) -> Option<&str> {
    let body = open_pat.strip_prefix('<')?;
    let end = body
        .find(|c: char| c.is_ascii_whitespace() || c == '>')
        .unwrap_or(body.len());
    (end > 0).then(|| &body[..end])
}

fn is_tag_boundary(lc: &str, at: usize) -> bool {
    lc.as_bytes()
        .get(at)
        .is_some_and(|b| b.is_ascii_whitespace() || *b == b'>' || *b == b'/')
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
