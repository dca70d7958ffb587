//! Block tokenizer and splice support.
//!
//! A declaration file is a sequence of `name { contents }` blocks,
//! optionally preceded by a type keyword (`table flicker { ... }`) and
//! interspersed with comments. The scanner counts braces to find the
//! matching closer; brace characters inside quoted string literals are
//! not special-cased, so a quoted `{` inside a block shifts the brace
//! count (known limitation, shared with the splicer below).

use std::io::{BufRead, Write};

use basalt_core::{BasaltError, BasaltResult};
use regex::Regex;

/// One named declaration block. The contents exclude the braces.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Block {
    pub name: String,
    pub contents: String,
}

/// Streaming scanner returning declaration blocks one at a time.
pub struct BlockTokeniser {
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl BlockTokeniser {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
        }
        Some(ch)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    /// Skip whitespace and comments in front of a name or block opener.
    fn skip_gap(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') => match self.chars.get(self.pos + 1).copied() {
                    Some('/') => {
                        while let Some(c) = self.peek() {
                            if c == '\n' {
                                break;
                            }
                            self.bump();
                        }
                    }
                    Some('*') => {
                        self.bump();
                        self.bump();
                        while self.pos < self.chars.len() {
                            if self.peek() == Some('*')
                                && self.chars.get(self.pos + 1).copied() == Some('/')
                            {
                                self.bump();
                                self.bump();
                                break;
                            }
                            self.bump();
                        }
                    }
                    _ => return,
                },
                _ => return,
            }
        }
    }

    /// Return the next `name { contents }` block, or `None` at the end
    /// of the stream. A name whose block never balances is an error.
    pub fn next_block(&mut self) -> BasaltResult<Option<Block>> {
        let mut name = String::new();

        // Collect name words until the opening brace. Multiple words
        // become a space-separated compound name ("table flicker").
        loop {
            self.skip_gap();

            match self.peek() {
                None => {
                    if name.is_empty() {
                        return Ok(None);
                    }
                    // Trailing name without a block; surface it as-is,
                    // the caller decides what to make of it.
                    return Ok(Some(Block {
                        name,
                        contents: String::new(),
                    }));
                }
                Some('{') => {
                    self.bump();
                    break;
                }
                Some(_) => {
                    let mut word = String::new();
                    while let Some(c) = self.peek() {
                        if c.is_whitespace() || c == '{' {
                            break;
                        }
                        if c == '/' {
                            let next = self.chars.get(self.pos + 1).copied();
                            if next == Some('/') || next == Some('*') {
                                break;
                            }
                        }
                        word.push(c);
                        self.bump();
                    }
                    if !name.is_empty() {
                        name.push(' ');
                    }
                    name.push_str(&word);
                }
            }
        }

        // Raw copy of the block contents, tracking nested braces.
        let mut contents = String::new();
        let mut depth = 1usize;

        while depth > 0 {
            match self.bump() {
                Some('{') => {
                    depth += 1;
                    contents.push('{');
                }
                Some('}') => {
                    depth -= 1;
                    if depth > 0 {
                        contents.push('}');
                    }
                }
                Some(c) => contents.push(c),
                None => {
                    return Err(BasaltError::parse(
                        format!("unexpected end of stream in block '{}'", name),
                        self.line,
                    ))
                }
            }
        }

        Ok(Some(Block { name, contents }))
    }
}

/// Copy lines from `input` to `output` until one matches `pattern`,
/// then consume and discard the matched declaration's brace-balanced
/// body without writing it, leaving the input cursor right behind it.
///
/// Returns true when the pattern matched; false when the whole input
/// was copied without a match.
pub fn pipe_until_insertion_point(
    input: &mut dyn BufRead,
    output: &mut dyn Write,
    pattern: &Regex,
) -> std::io::Result<bool> {
    let mut line = String::new();

    loop {
        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Ok(false);
        }

        if pattern.is_match(line.trim_end_matches(['\r', '\n'])) {
            // Skip the declaration body, tracking braces from the
            // matched line onwards; the opener may sit on a later line.
            let mut depth = count_braces(&line, 0);
            let mut started = depth.1;
            let mut level = depth.0;

            while !(started && level == 0) {
                line.clear();
                if input.read_line(&mut line)? == 0 {
                    break;
                }
                depth = count_braces(&line, level);
                level = depth.0;
                started = started || depth.1;
            }

            return Ok(true);
        }

        output.write_all(line.as_bytes())?;
    }
}

/// Apply the brace deltas of one line to `level`; the second component
/// reports whether any opening brace was seen.
fn count_braces(line: &str, mut level: usize) -> (usize, bool) {
    let mut seen_open = false;
    for ch in line.chars() {
        match ch {
            '{' => {
                level += 1;
                seen_open = true;
            }
            '}' => level = level.saturating_sub(1),
            _ => {}
        }
    }
    (level, seen_open)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;

    fn blocks(src: &str) -> Vec<Block> {
        let mut tok = BlockTokeniser::new(src);
        let mut result = Vec::new();
        while let Some(block) = tok.next_block().unwrap() {
            result.push(block);
        }
        result
    }

    #[test]
    fn test_two_blocks() {
        let found = blocks("textures/a { diffusemap a }\ntextures/b { diffusemap b }");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, "textures/a");
        assert_eq!(found[0].contents.trim(), "diffusemap a");
        assert_eq!(found[1].name, "textures/b");
    }

    #[test]
    fn test_nested_braces() {
        let found = blocks("mat {\n\touter\n\t{\n\t\tmap x\n\t}\n}");
        assert_eq!(found.len(), 1);
        assert!(found[0].contents.contains("{"));
        assert!(found[0].contents.contains("map x"));
    }

    #[test]
    fn test_typed_name() {
        let found = blocks("table flicker { { 0, 1 } }");
        assert_eq!(found[0].name, "table flicker");
        assert_eq!(found[0].contents.trim(), "{ 0, 1 }");
    }

    #[test]
    fn test_comment_between_name_and_block() {
        let found = blocks("textures/a // editor hint\n{ map x }");
        assert_eq!(found[0].name, "textures/a");
        assert!(found[0].contents.contains("map x"));
    }

    #[test]
    fn test_comment_before_name() {
        let found = blocks("/* header */\n// note\ntextures/a { map x }");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "textures/a");
    }

    #[test]
    fn test_unbalanced_block_fails() {
        let mut tok = BlockTokeniser::new("textures/a { map x ");
        assert!(tok.next_block().is_err());
    }

    #[test]
    fn test_empty_input() {
        assert!(blocks("  \n\t // nothing here\n").is_empty());
    }

    fn splice(input: &str, name: &str) -> (String, bool, String) {
        let pattern = Regex::new(&format!(r"(?i)^\s*{}\s*(\{{.*)?$", regex::escape(name))).unwrap();
        let mut reader = BufReader::new(input.as_bytes());
        let mut copied = Vec::new();
        let found = pipe_until_insertion_point(&mut reader, &mut copied, &pattern).unwrap();
        let mut rest = String::new();
        std::io::Read::read_to_string(&mut reader, &mut rest).unwrap();
        (String::from_utf8(copied).unwrap(), found, rest)
    }

    #[test]
    fn test_splice_finds_and_skips_block() {
        let input = "a\n{\n\tmap x\n}\nb\n{\n\tmap y\n}\nc\n{\n\tmap z\n}\n";
        let (copied, found, rest) = splice(input, "b");
        assert!(found);
        assert_eq!(copied, "a\n{\n\tmap x\n}\n");
        assert_eq!(rest, "c\n{\n\tmap z\n}\n");
    }

    #[test]
    fn test_splice_brace_on_name_line() {
        let input = "a {\n\tmap x\n}\nb {\n\tmap y\n}\n";
        let (copied, found, rest) = splice(input, "a");
        assert!(found);
        assert_eq!(copied, "");
        assert_eq!(rest, "b {\n\tmap y\n}\n");
    }

    #[test]
    fn test_splice_no_match_copies_everything() {
        let input = "a\n{\n\tmap x\n}\n";
        let (copied, found, rest) = splice(input, "missing");
        assert!(!found);
        assert_eq!(copied, input);
        assert_eq!(rest, "");
    }

    #[test]
    fn test_splice_is_case_insensitive() {
        let input = "Textures/Stone/Wall\n{\n\tmap x\n}\nrest\n{\n}\n";
        let (_, found, rest) = splice(input, "textures/stone/wall");
        assert!(found);
        assert_eq!(rest, "rest\n{\n}\n");
    }
}
