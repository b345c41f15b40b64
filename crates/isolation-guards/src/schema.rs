//! Lexical cross-schema check for outgoing SQL.
//!
//! The scanner tokenizes the statement (skipping string literals and
//! comments, descending into dollar-quoted bodies) and resolves every
//! dotted name to the schema it names. It runs in addition to pinning the
//! connection's `search_path`, never instead of it: unqualified names are
//! left to the search path.

use std::collections::{BTreeSet, HashSet};

use tenantgate_core_types::{GateError, GateResult};
use tracing::warn;

const SEARCH_PATH: &str = "search_path";

/// Schemas every tenant may reference.
pub const SYSTEM_SCHEMAS: &[&str] = &["public", "information_schema", "pg_catalog", "pg_temp"];

pub fn is_system_schema(schema: &str) -> bool {
    SYSTEM_SCHEMAS.contains(&schema)
}

/// Fails with `CrossSchemaAccess` when `statement` names a schema other than
/// `expected_schema` or one of [`SYSTEM_SCHEMAS`].
pub fn assert_query_isolation(statement: &str, expected_schema: &str) -> GateResult<()> {
    for schema in referenced_schemas(statement) {
        if schema == expected_schema || is_system_schema(&schema) {
            continue;
        }
        warn!(
            target: "isolation-guards",
            expected = %expected_schema,
            referenced = %schema,
            "cross-schema reference denied"
        );
        return Err(GateError::CrossSchemaAccess);
    }
    Ok(())
}

/// Fails with `MultipleStatements` when `statement` carries more than one
/// top-level statement. A single trailing `;` is accepted.
pub fn assert_single_statement(statement: &str) -> GateResult<()> {
    let tokens = tokenize(statement);
    let terminators = tokens.iter().filter(|t| **t == Token::Terminator).count();
    let trailing_only = terminators == 1 && tokens.last() == Some(&Token::Terminator);
    if terminators == 0 || trailing_only {
        return Ok(());
    }
    warn!(target: "isolation-guards", terminators, "multi-statement request denied");
    Err(GateError::MultipleStatements)
}

/// True when any statement, including ones inside dollar-quoted bodies,
/// could move a connection off its pinned `search_path`.
pub(crate) fn changes_search_path(statement: &str) -> bool {
    let tokens = tokenize(statement);
    (0..tokens.len()).any(|i| search_path_change_at(&tokens, i))
}

fn search_path_change_at(tokens: &[Token], i: usize) -> bool {
    let names_search_path = |token: Option<&Token>| {
        token
            .and_then(Token::word)
            .is_some_and(|word| word.text.eq_ignore_ascii_case(SEARCH_PATH))
    };

    match tokens[i].keyword() {
        Some("set") => {
            let mut at = i + 1;
            if matches!(tokens.get(at).and_then(Token::keyword), Some("session" | "local")) {
                at += 1;
            }
            // SET SCHEMA is an alias for SET search_path
            names_search_path(tokens.get(at))
                || tokens.get(at).and_then(Token::keyword) == Some("schema")
        }
        Some("reset" | "discard") => tokens.get(i + 1).and_then(Token::word).is_some(),
        _ => {
            let is_set_config = tokens[i]
                .word()
                .is_some_and(|word| word.text.eq_ignore_ascii_case("set_config"))
                && tokens.get(i + 1) == Some(&Token::Punct('('));
            if !is_set_config {
                return false;
            }
            // only a plain literal naming another setting is harmless
            match (tokens.get(i + 2), tokens.get(i + 3)) {
                (Some(Token::Literal(Some(name))), Some(Token::Punct(','))) => {
                    name.trim().eq_ignore_ascii_case(SEARCH_PATH)
                }
                _ => true,
            }
        }
    }
}

/// Schemas named by qualified identifiers in `statement`. Unquoted names are folded to lowercase.
pub fn referenced_schemas(statement: &str) -> BTreeSet<String> {
    let tokens = tokenize(statement);
    let scope = analyze(&tokens);

    let mut schemas = BTreeSet::new();
    for start in 0..tokens.len() {
        if !matches!(tokens[start], Token::Word(_)) {
            continue;
        }
        if start > 0 && tokens[start - 1] == Token::Dot {
            continue;
        }
        let (parts, end) = chain_at(&tokens, start);
        if parts.len() < 2 {
            continue;
        }

        let schema = if scope.relation_starts.contains(&start) {
            &parts[parts.len() - 2]
        } else {
            let is_call = tokens.get(end) == Some(&Token::Punct('('));
            let is_type = start > 0 && tokens[start - 1] == Token::Punct(':');
            if is_call || is_type {
                &parts[parts.len() - 2]
            } else if scope.relations.contains(&parts[0]) {
                // alias.column or table.column
                continue;
            } else if parts.len() >= 4 {
                &parts[1]
            } else {
                &parts[0]
            }
        };
        schemas.insert(schema.clone());
    }
    schemas
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    /// Identifier or keyword. Unquoted text is lowercased; quoted text is kept as written.
    Word(Word),
    Dot,
    Star,
    Punct(char),
    /// Text is kept for plain `'...'` strings only.
    Literal(Option<String>),
    /// `;` outside literals, comments and dollar-quoted bodies.
    Terminator,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Word {
    text: String,
    quoted: bool,
}

impl Token {
    fn keyword(&self) -> Option<&str> {
        match self {
            Token::Word(word) if !word.quoted => Some(word.text.as_str()),
            _ => None,
        }
    }

    fn word(&self) -> Option<&Word> {
        match self {
            Token::Word(word) => Some(word),
            _ => None,
        }
    }
}

fn tokenize(sql: &str) -> Vec<Token> {
    let chars: Vec<char> = sql.chars().collect();
    let mut tokens = Vec::new();
    lex(&chars, &mut tokens, false);
    tokens
}

fn lex(chars: &[char], out: &mut Vec<Token>, nested: bool) {
    let len = chars.len();
    let peek = |i: usize| chars.get(i).copied();
    let mut i = 0;

    while i < len {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '-' if peek(i + 1) == Some('-') => {
                while i < len && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if peek(i + 1) == Some('*') => {
                let mut depth = 1;
                i += 2;
                while i < len && depth > 0 {
                    if chars[i] == '/' && peek(i + 1) == Some('*') {
                        depth += 1;
                        i += 2;
                    } else if chars[i] == '*' && peek(i + 1) == Some('/') {
                        depth -= 1;
                        i += 2;
                    } else {
                        i += 1;
                    }
                }
            }
            '\'' => {
                let end = skip_string(chars, i, false);
                out.push(Token::Literal(Some(string_text(chars, i, end))));
                i = end;
            }
            ';' if !nested => {
                out.push(Token::Terminator);
                i += 1;
            }
            '"' => {
                let (text, next) = read_quoted(chars, i);
                out.push(Token::Word(Word { text, quoted: true }));
                i = next;
            }
            '$' => match dollar_tag_end(chars, i) {
                Some(tag_end) => {
                    let tag = &chars[i..tag_end];
                    let body_end = chars[tag_end..]
                        .windows(tag.len())
                        .position(|window| window == tag)
                        .map(|offset| tag_end + offset)
                        .unwrap_or(len);
                    lex(&chars[tag_end..body_end], out, true);
                    i = (body_end + tag.len()).min(len);
                }
                None => {
                    i += 1;
                    while i < len && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                    out.push(Token::Literal(None));
                }
            },
            '.' => {
                out.push(Token::Dot);
                i += 1;
            }
            '*' => {
                out.push(Token::Star);
                i += 1;
            }
            c if c.is_ascii_digit() => {
                while i < len && (chars[i].is_ascii_alphanumeric() || matches!(chars[i], '.' | '_')) {
                    i += 1;
                }
                out.push(Token::Literal(None));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < len && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | '$')) {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect::<String>().to_lowercase();
                match (text.as_str(), peek(i)) {
                    ("e", Some('\'')) => {
                        i = skip_string(chars, i, true);
                        out.push(Token::Literal(None));
                    }
                    ("b" | "x" | "n", Some('\'')) => {
                        i = skip_string(chars, i, false);
                        out.push(Token::Literal(None));
                    }
                    ("u", Some('&')) if peek(i + 1) == Some('"') => {
                        let (text, next) = read_quoted(chars, i + 1);
                        out.push(Token::Word(Word { text, quoted: true }));
                        i = next;
                    }
                    _ => out.push(Token::Word(Word {
                        text,
                        quoted: false,
                    })),
                }
            }
            other => {
                out.push(Token::Punct(other));
                i += 1;
            }
        }
    }
}

/// `start` points at the opening quote. Returns the index after the closing one.
fn skip_string(chars: &[char], start: usize, backslash_escapes: bool) -> usize {
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' if backslash_escapes => i += 2,
            '\'' if chars.get(i + 1) == Some(&'\'') => i += 2,
            '\'' => return i + 1,
            _ => i += 1,
        }
    }
    chars.len()
}

fn read_quoted(chars: &[char], start: usize) -> (String, usize) {
    let mut text = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '"' if chars.get(i + 1) == Some(&'"') => {
                text.push('"');
                i += 2;
            }
            '"' => return (text, i + 1),
            other => {
                text.push(other);
                i += 1;
            }
        }
    }
    (text, chars.len())
}

/// Contents of the plain string spanning `start..end`, with doubled quotes collapsed.
fn string_text(chars: &[char], start: usize, end: usize) -> String {
    let close = if end > start + 1 && chars.get(end - 1) == Some(&'\'') {
        end - 1
    } else {
        end
    };
    chars[start + 1..close]
        .iter()
        .collect::<String>()
        .replace("''", "'")
}

/// Index just past the opening `$tag$`, or `None` for a positional parameter or stray `$`.
fn dollar_tag_end(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start + 1;
    if chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
        return None;
    }
    while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
        i += 1;
    }
    (chars.get(i) == Some(&'$')).then_some(i + 1)
}

/// Collects `a.b.c` starting at `start`. A trailing `.*` is kept as a `*` part.
fn chain_at(tokens: &[Token], start: usize) -> (Vec<String>, usize) {
    let mut parts = Vec::new();
    let Some(first) = tokens[start].word() else {
        return (parts, start);
    };
    parts.push(first.text.clone());

    let mut i = start + 1;
    while tokens.get(i) == Some(&Token::Dot) {
        match tokens.get(i + 1) {
            Some(Token::Word(word)) => {
                parts.push(word.text.clone());
                i += 2;
            }
            Some(Token::Star) => {
                parts.push("*".to_string());
                i += 2;
                break;
            }
            _ => break,
        }
    }
    (parts, i)
}

const RELATION_KEYWORDS: &[&str] = &[
    "from", "join", "into", "update", "table", "references", "truncate", "copy",
];

/// Keywords that open a subquery when they follow `(` directly.
const SUBQUERY_KEYWORDS: &[&str] = &["select", "with", "values", "table"];

const RELATION_MODIFIERS: &[&str] = &["only", "lateral", "if", "not", "exists"];

const CLAUSE_KEYWORDS: &[&str] = &[
    "all", "and", "as", "between", "by", "case", "conflict", "cross", "default", "distinct",
    "do", "else", "end", "except", "false", "fetch", "for", "from", "full", "group", "having",
    "in", "inner", "intersect", "into", "is", "join", "left", "like", "limit", "natural", "not",
    "null", "offset", "on", "or", "order", "outer", "recursive", "returning", "right", "select",
    "set", "tablesample", "then", "true", "union", "using", "values", "when", "where", "window",
    "with",
];

fn is_clause_keyword(token: &Token) -> bool {
    token
        .keyword()
        .is_some_and(|kw| CLAUSE_KEYWORDS.contains(&kw) || RELATION_KEYWORDS.contains(&kw))
}

/// Word that can name an alias: any quoted word, or an unquoted non-keyword.
fn alias_word(token: &Token) -> Option<&str> {
    let word = token.word()?;
    if is_clause_keyword(token) {
        return None;
    }
    Some(word.text.as_str())
}

#[derive(Default)]
struct StatementScope {
    /// Relations, aliases and CTE names introduced by the statement.
    relations: HashSet<String>,
    /// Token indexes where a name in relation position begins.
    relation_starts: HashSet<usize>,
}

impl StatementScope {
    fn alias_after(&mut self, tokens: &[Token], at: usize) -> usize {
        let (candidate, next) = if tokens.get(at).and_then(Token::keyword) == Some("as") {
            (at + 1, at + 2)
        } else {
            (at, at + 1)
        };
        let Some(alias) = tokens.get(candidate).and_then(alias_word) else {
            return at;
        };
        if tokens.get(candidate + 1) == Some(&Token::Dot) {
            return at;
        }
        self.relations.insert(alias.to_string());
        next
    }

    fn relation_at(&mut self, tokens: &[Token], mut at: usize) -> usize {
        while tokens
            .get(at)
            .and_then(Token::keyword)
            .is_some_and(|kw| RELATION_MODIFIERS.contains(&kw))
        {
            at += 1;
        }
        let Some(token) = tokens.get(at) else {
            return at;
        };
        if token.word().is_none() || is_clause_keyword(token) {
            return at;
        }
        let (parts, end) = chain_at(tokens, at);
        self.relation_starts.insert(at);
        if let Some(name) = parts.last() {
            self.relations.insert(name.clone());
        }
        self.alias_after(tokens, end)
    }
}

fn analyze(tokens: &[Token]) -> StatementScope {
    let mut scope = StatementScope::default();
    scope
        .relations
        .extend(["excluded", "new", "old"].map(String::from));

    // true for parentheses that open a function call
    let mut parens: Vec<bool> = Vec::new();
    let mut from_list = false;
    let mut i = 0;

    while i < tokens.len() {
        let token = &tokens[i];
        match token {
            Token::Punct('(') => {
                let opens_subquery = tokens
                    .get(i + 1)
                    .and_then(Token::keyword)
                    .is_some_and(|kw| SUBQUERY_KEYWORDS.contains(&kw));
                let is_call = !opens_subquery
                    && i > 0
                    && tokens[i - 1].word().is_some()
                    && !is_clause_keyword(&tokens[i - 1]);
                parens.push(is_call);
            }
            Token::Punct(')') => {
                parens.pop();
                let next = scope.alias_after(tokens, i + 1);
                if next > i + 1 {
                    i = next;
                    continue;
                }
            }
            Token::Punct(',') if from_list => {
                i = scope.relation_at(tokens, i + 1);
                continue;
            }
            Token::Word(word)
                if tokens.get(i + 1).and_then(Token::keyword) == Some("as")
                    && tokens.get(i + 2) == Some(&Token::Punct('(')) =>
            {
                scope.relations.insert(word.text.clone());
            }
            _ => {}
        }

        if let Some(kw) = token.keyword() {
            // FROM inside a call is an argument separator: extract(year FROM ts)
            let call_argument = kw == "from" && parens.last() == Some(&true);
            if RELATION_KEYWORDS.contains(&kw) && !call_argument {
                from_list = matches!(kw, "from" | "join");
                i = scope.relation_at(tokens, i + 1);
                continue;
            }
            if CLAUSE_KEYWORDS.contains(&kw) {
                from_list = false;
            }
        }
        i += 1;
    }
    scope
}
