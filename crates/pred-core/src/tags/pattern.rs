//! Positional tag wildcards.
//!
//! A wildcard has one element per tag position: `?` matches any character,
//! `[...]` matches any character of the set, anything else matches itself.

#[derive(Debug, Clone, PartialEq, Eq)]
enum Element {
    Any,
    OneOf(Vec<char>),
    Exact(char),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagPattern {
    elements: Vec<Element>,
}

impl TagPattern {
    /// Parse a wildcard. An unterminated `[` is taken literally.
    pub fn parse(wildcard: &str) -> Self {
        let chars: Vec<char> = wildcard.chars().collect();
        let mut elements = Vec::with_capacity(chars.len());
        let mut i = 0;
        while i < chars.len() {
            match chars[i] {
                '?' => elements.push(Element::Any),
                '[' => match chars[i + 1..].iter().position(|&c| c == ']') {
                    Some(close) => {
                        let set = chars[i + 1..i + 1 + close].to_vec();
                        elements.push(Element::OneOf(set));
                        i += close + 1;
                    }
                    None => elements.push(Element::Exact('[')),
                },
                c => elements.push(Element::Exact(c)),
            }
            i += 1;
        }
        Self { elements }
    }

    pub fn matches(&self, tag: &str) -> bool {
        let mut chars = tag.chars();
        for element in &self.elements {
            let Some(c) = chars.next() else {
                return false;
            };
            let ok = match element {
                Element::Any => true,
                Element::OneOf(set) => set.contains(&c),
                Element::Exact(e) => *e == c,
            };
            if !ok {
                return false;
            }
        }
        chars.next().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_and_any() {
        let p = TagPattern::parse("NN??1");
        assert!(p.matches("NNFS1"));
        assert!(p.matches("NNMP1"));
        assert!(!p.matches("NNFS2"));
        assert!(!p.matches("NNFS"));
        assert!(!p.matches("NNFS12"));
    }

    #[test]
    fn test_char_set() {
        let p = TagPattern::parse("PP[-1]");
        assert!(p.matches("PP-"));
        assert!(p.matches("PP1"));
        assert!(!p.matches("PP2"));
    }

    #[test]
    fn test_unterminated_bracket_is_literal() {
        let p = TagPattern::parse("A[");
        assert!(p.matches("A["));
        assert!(!p.matches("AB"));
    }

    #[test]
    fn test_wildcard_from_tag() {
        let p = TagPattern::parse(&crate::tags::tag_wildcard("PP-S2--2-------"));
        assert!(p.matches("PP-P2--2-------"));
        assert!(p.matches("PP-S2--2------1"));
        assert!(!p.matches("PP-S3--2-------"));
        assert!(!p.matches("PP-S2--2------2"));
    }
}
