//! Splits filter text into flat `{left, operation, right}` token sets.
//!
//! The tokenizer works on space-separated blocks and only recognises operators at parenthesis
//! depth zero and outside quoted literals. It does not apply precedence: `a and b or c` comes out
//! as three comparisons separated by two combinator markers, and the parser folds them left to
//! right.

use log::trace;

const OPERATIONS: [&str; 14] = [
    "eq", "ne", "gt", "ge", "lt", "le", "and", "or", "not", "add", "sub", "mul", "div", "mod",
];

const COMBINATORS: [&str; 3] = ["and", "or", "not"];

const IMPLIED_BOOLEAN_FUNCTIONS: [&str; 3] = ["substringof", "endswith", "startswith"];

/// A single parse unit produced by [`tokenize`].
///
/// A set with an empty `left` and `right` is a combinator marker that joins the sets around it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSet {
    pub left: String,
    pub operation: String,
    pub right: String,
}

impl TokenSet {
    fn marker(operation: &str) -> Self {
        Self {
            operation: operation.to_ascii_lowercase(),
            ..Default::default()
        }
    }

    /// Whether this set only carries a combinator.
    pub fn is_marker(&self) -> bool {
        self.left.trim().is_empty() && self.right.trim().is_empty() && !self.operation.is_empty()
    }
}

/// Returns whether `token` is one of the filter operators, ignoring case.
pub fn is_operation(token: &str) -> bool {
    OPERATIONS.iter().any(|op| op.eq_ignore_ascii_case(token))
}

/// Returns whether `token` is `and`, `or` or `not`, ignoring case.
pub fn is_combinator(token: &str) -> bool {
    COMBINATORS.iter().any(|op| op.eq_ignore_ascii_case(token))
}

/// Tokenizes filter text. Blank text produces no token sets.
pub fn tokenize(filter: &str) -> Vec<TokenSet> {
    let mut filter = filter.trim();
    if filter.is_empty() {
        return Vec::new();
    }
    if let Some(inner) = strip_enclosing(filter) {
        filter = inner;
    }
    if is_implied_boolean(filter) {
        return Vec::new();
    }

    let blocks: Vec<&str> = filter.split(' ').filter(|b| !b.is_empty()).collect();
    let mut sets = Vec::new();
    let mut current = TokenSet::default();
    let mut depth: i64 = 0;
    let mut quote = None;
    let mut start = 0;

    for (index, block) in blocks.iter().enumerate() {
        depth += parenthesis_balance(block, &mut quote);
        if depth != 0 || quote.is_some() || !is_operation(block) {
            continue;
        }
        if current.left.trim().is_empty() {
            current.left = blocks[start..index].join(" ");
            current.operation = (*block).to_string();
            start = index + 1;
            if is_combinator(block) {
                current.right = blocks[start..].join(" ");
                sets.push(current);
                trace!("tokenized '{filter}' into {sets:?}");
                return sets;
            }
        } else {
            current.right = blocks[start..index].join(" ");
            sets.push(std::mem::take(&mut current));
            start = index + 1;
            if is_combinator(block) {
                sets.push(TokenSet::marker(block));
            }
        }
    }

    let remaining = blocks[start..].join(" ");
    if !current.left.trim().is_empty() {
        current.right = remaining;
        sets.push(current);
    } else if start > 0 && is_enclosed(&remaining) {
        // A group equal to the whole filter would tokenize to itself forever.
        sets.push(TokenSet {
            left: remaining,
            ..Default::default()
        });
    }
    trace!("tokenized '{filter}' into {sets:?}");
    sets
}

/// Returns whether `text` is a bare call to one of the boolean string functions, such as
/// `substringof('a', Name)`, which is a complete predicate on its own.
pub fn is_implied_boolean(text: &str) -> bool {
    let text = text.trim();
    if text.is_empty() || is_enclosed(text) || !text.contains('(') || !text.contains(')') {
        return false;
    }
    if bare_words(text).any(|word| OPERATIONS.contains(&word) || COMBINATORS.contains(&word)) {
        return false;
    }
    let first = text.split(' ').next().unwrap_or_default().to_ascii_lowercase();
    IMPLIED_BOOLEAN_FUNCTIONS
        .iter()
        .any(|name| first.starts_with(name))
}

/// Returns whether `text` starts with `(` and ends with `)`.
pub fn is_enclosed(text: &str) -> bool {
    enclosed_inner(text).is_some()
}

/// Returns the text between an outer `(` and `)`, if the text is wrapped in them.
pub(crate) fn enclosed_inner(text: &str) -> Option<&str> {
    text.strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .filter(|inner| !inner.is_empty())
}

/// Strips one outer pair of parentheses, unless doing so would orphan the parentheses inside.
pub(crate) fn strip_enclosing(text: &str) -> Option<&str> {
    enclosed_inner(text)
        .filter(|inner| !has_orphaned_open_parenthesis(inner))
        .map(str::trim)
}

/// Detects text like `a eq 1) and (b eq 2` where stripping the outer parentheses of
/// `(a eq 1) and (b eq 2)` would have left a close before its open.
fn has_orphaned_open_parenthesis(text: &str) -> bool {
    let opens: Vec<usize> = text.match_indices('(').map(|(i, _)| i).collect();
    let closes: Vec<usize> = text.match_indices(')').map(|(i, _)| i).collect();
    opens.len() == closes.len()
        && opens
            .iter()
            .zip(closes.iter())
            .any(|(open, close)| close < open)
}

/// Parenthesis balance of a block, skipping quoted text. `quote` holds a quote left open by an
/// earlier block.
fn parenthesis_balance(block: &str, quote: &mut Option<char>) -> i64 {
    block.chars().fold(0, |depth, c| match (*quote, c) {
        (Some(open), c) if c == open => {
            *quote = None;
            depth
        }
        (Some(_), _) => depth,
        (None, '\'' | '"') => {
            *quote = Some(c);
            depth
        }
        (None, '(') => depth + 1,
        (None, ')') => depth - 1,
        _ => depth,
    })
}

/// The space-separated words of `text` that sit outside quoted literals.
fn bare_words(text: &str) -> impl Iterator<Item = &str> {
    let mut quote = None;
    text.split(' ').filter(move |word| {
        let bare = quote.is_none();
        parenthesis_balance(word, &mut quote);
        bare && quote.is_none()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(left: &str, operation: &str, right: &str) -> TokenSet {
        TokenSet {
            left: left.to_string(),
            operation: operation.to_string(),
            right: right.to_string(),
        }
    }

    #[test]
    fn blank_text_has_no_tokens() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn single_comparison() {
        assert_eq!(tokenize("MessageId eq 1"), vec![set("MessageId", "eq", "1")]);
    }

    #[test]
    fn unparenthesized_chain_yields_markers() {
        let sets = tokenize("a eq 1 and b eq 2 or c eq 3");
        assert_eq!(
            sets,
            vec![
                set("a", "eq", "1"),
                TokenSet::marker("and"),
                set("b", "eq", "2"),
                TokenSet::marker("or"),
                set("c", "eq", "3"),
            ]
        );
        assert!(sets[1].is_marker());
    }

    #[test]
    fn parenthesized_groups_split_on_the_combinator() {
        assert_eq!(
            tokenize("(a eq 1) and (b eq 2)"),
            vec![set("(a eq 1)", "and", "(b eq 2)")]
        );
    }

    #[test]
    fn outer_parentheses_are_stripped() {
        assert_eq!(tokenize("(a eq 1)"), vec![set("a", "eq", "1")]);
        assert_eq!(
            tokenize("((a eq 1) or (b eq 2))"),
            vec![set("(a eq 1)", "or", "(b eq 2)")]
        );
    }

    #[test]
    fn leading_not_takes_the_rest() {
        assert_eq!(
            tokenize("not (a lt 1 or a gt 5)"),
            vec![set("", "not", "(a lt 1 or a gt 5)")]
        );
    }

    #[test]
    fn trailing_group_after_combinator() {
        assert_eq!(
            tokenize("a eq 1 and (b eq 2)"),
            vec![
                set("a", "eq", "1"),
                TokenSet::marker("and"),
                set("(b eq 2)", "", ""),
            ]
        );
    }

    #[test]
    fn chained_arithmetic_keeps_the_last_operator() {
        // Only combinators chain; the trailing `gt 10` is dropped.
        assert_eq!(
            tokenize("MessageId add 5 gt 10"),
            vec![set("MessageId", "add", "5")]
        );
    }

    #[test]
    fn implied_boolean_calls_are_atomic() {
        assert!(is_implied_boolean("substringof('a', Name)"));
        assert!(is_implied_boolean("StartsWith(Name, 'x')"));
        assert!(!is_implied_boolean("substringof('a', Name) eq true"));
        assert!(!is_implied_boolean("(substringof('a', Name))"));
        assert!(tokenize("endswith(Name, 'z')").is_empty());
    }

    #[test]
    fn operators_inside_calls_are_ignored() {
        assert_eq!(
            tokenize("tolower(Name) eq 'a b'"),
            vec![set("tolower(Name)", "eq", "'a b'")]
        );
        assert_eq!(
            tokenize("substring(Name, 1) eq 'x'"),
            vec![set("substring(Name, 1)", "eq", "'x'")]
        );
    }

    #[test]
    fn operators_inside_quotes_are_text() {
        assert_eq!(
            tokenize("Name eq 'salt and pepper'"),
            vec![set("Name", "eq", "'salt and pepper'")]
        );
        assert_eq!(
            tokenize("(Name eq 'a) or (b') and BooleanValue"),
            vec![set("(Name eq 'a) or (b')", "and", "BooleanValue")]
        );
        assert!(is_implied_boolean("substringof('not eq', Name)"));
        assert!(tokenize("startswith(Name, 'x or y')").is_empty());
    }

    #[test]
    fn orphaned_parentheses_are_not_stripped() {
        assert!(has_orphaned_open_parenthesis("a eq 1) and (b eq 2"));
        assert!(!has_orphaned_open_parenthesis("a eq (1)"));
    }

    #[test]
    fn self_referencing_group_is_not_yielded() {
        assert!(tokenize("(a) (b)").is_empty());
    }
}
