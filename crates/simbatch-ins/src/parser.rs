use crate::factor::Factor;
use crate::normaliser::normalise;
use crate::parameter::{find_comment, InstructionParameter};
use crate::InsError;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const PFT_BLOCK: &str = "pft";
const INCLUDE_PARAMETER: &str = "include";
const DEFAULT_INDENT: &str = "    ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    Lf,
    CrLf,
    /// Final line of a file that does not end with a terminator.
    None,
}

impl LineEnding {
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
            LineEnding::None => "",
        }
    }
}

/// One textual appearance of a parameter.
#[derive(Debug, Clone)]
pub struct ParameterOccurrence {
    name: String,
    pre_value: String,
    value: InstructionParameter,
    line: Option<usize>,
}

impl ParameterOccurrence {
    fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            pre_value: " ".to_string(),
            value: InstructionParameter::new(value),
            line: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &InstructionParameter {
        &self.value
    }

    /// 1-based source line, or `None` for parameters added after parsing.
    pub fn line(&self) -> Option<usize> {
        self.line
    }

    fn set_value(&mut self, value: &str) {
        self.value = InstructionParameter::new(value);
    }

    fn render(&self, out: &mut String) {
        out.push_str(&self.name);
        out.push_str(&self.pre_value);
        out.push_str(self.value.raw());
    }
}

/// A slice of a source line. Concatenating the segments of a line yields the
/// line text exactly.
#[derive(Debug, Clone)]
pub enum Segment {
    Text(String),
    Parameter(ParameterOccurrence),
}

#[derive(Debug, Clone)]
pub struct Line {
    number: Option<usize>,
    segments: Vec<Segment>,
    ending: LineEnding,
}

impl Line {
    pub fn number(&self) -> Option<usize> {
        self.number
    }

    pub fn ending(&self) -> LineEnding {
        self.ending
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn text(&self) -> String {
        let mut out = String::new();
        self.render_text(&mut out);
        out
    }

    pub fn parameters(&self) -> impl Iterator<Item = &ParameterOccurrence> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Parameter(occurrence) => Some(occurrence),
            Segment::Text(_) => None,
        })
    }

    fn render_text(&self, out: &mut String) {
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Parameter(occurrence) => occurrence.render(out),
            }
        }
    }

    fn render(&self, out: &mut String) {
        self.render_text(out);
        out.push_str(self.ending.as_str());
    }

    /// Leading whitespace of a line that starts with a parameter.
    fn indent(&self) -> Option<&str> {
        match self.segments.as_slice() {
            [Segment::Parameter(_), ..] => Some(""),
            [Segment::Text(text), Segment::Parameter(_), ..]
                if text.chars().all(char::is_whitespace) =>
            {
                Some(text.as_str())
            }
            _ => None,
        }
    }
}

fn last_occurrence_mut<'a>(
    lines: impl DoubleEndedIterator<Item = &'a mut Line>,
    name: &str,
) -> Option<&'a mut ParameterOccurrence> {
    lines
        .rev()
        .flat_map(|line| line.segments.iter_mut().rev())
        .find_map(|segment| match segment {
            Segment::Parameter(occurrence) if occurrence.name == name => Some(occurrence),
            _ => None,
        })
}

/// A typed, named, parenthesised group of parameters, e.g. `pft "TeBE" ( ... )`.
#[derive(Debug, Clone)]
pub struct Block {
    kind: String,
    name: String,
    lines: Vec<Line>,
}

impl Block {
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source lines from the header through the closing parenthesis.
    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn first_line(&self) -> Option<usize> {
        self.lines.first().and_then(Line::number)
    }

    /// Every parameter occurrence in source order, duplicates included.
    pub fn occurrences(&self) -> impl Iterator<Item = &ParameterOccurrence> {
        self.lines.iter().flat_map(Line::parameters)
    }

    /// Current value of a parameter; the last occurrence wins.
    pub fn parameter(&self, name: &str) -> Option<&InstructionParameter> {
        self.occurrences()
            .filter(|occurrence| occurrence.name == name)
            .last()
            .map(ParameterOccurrence::value)
    }

    pub fn parameters(&self) -> BTreeMap<&str, &InstructionParameter> {
        let mut parameters = BTreeMap::new();
        for occurrence in self.occurrences() {
            parameters.insert(occurrence.name(), occurrence.value());
        }
        parameters
    }

    pub fn contains(&self, name: &str) -> bool {
        self.occurrences().any(|occurrence| occurrence.name == name)
    }

    fn set(&mut self, name: &str, value: &str, ending: LineEnding) -> Result<(), InsError> {
        if let Some(occurrence) = last_occurrence_mut(self.lines.iter_mut(), name) {
            occurrence.set_value(value);
            return Ok(());
        }

        let occurrence = ParameterOccurrence::new(name, value);
        if self.lines.len() >= 2 {
            let indent = self
                .lines
                .iter()
                .skip(1)
                .find_map(Line::indent)
                .unwrap_or(DEFAULT_INDENT)
                .to_string();
            let line = Line {
                number: None,
                segments: vec![Segment::Text(indent), Segment::Parameter(occurrence)],
                ending,
            };
            let close = self.lines.len() - 1;
            self.lines.insert(close, line);
            return Ok(());
        }

        self.insert_inline(occurrence)
    }

    /// Adds a parameter to a block whose header and closing parenthesis share
    /// one line.
    fn insert_inline(&mut self, occurrence: ParameterOccurrence) -> Result<(), InsError> {
        let no_close = || InsError::InlineBlock {
            kind: self.kind.clone(),
            name: self.name.clone(),
        };
        let line = self.lines.first().ok_or_else(no_close)?;
        let position = line
            .segments
            .iter()
            .enumerate()
            .rev()
            .find_map(|(index, segment)| match segment {
                Segment::Text(text) if !text.starts_with('!') => {
                    text.rfind(')').map(|offset| (index, offset))
                }
                _ => None,
            });
        let (index, offset) = position.ok_or_else(no_close)?;

        let line = &mut self.lines[0];
        let Segment::Text(text) = line.segments.remove(index) else {
            return Err(no_close());
        };
        let (before, after) = text.split_at(offset);
        let mut head = before.to_string();
        if !head.ends_with(char::is_whitespace) {
            head.push(' ');
        }
        line.segments.insert(index, Segment::Text(format!(" {after}")));
        line.segments.insert(index, Segment::Parameter(occurrence));
        line.segments.insert(index, Segment::Text(head));
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum Item {
    Line(Line),
    Block(Block),
}

impl Item {
    fn render(&self, out: &mut String) {
        match self {
            Item::Line(line) => line.render(out),
            Item::Block(block) => {
                for line in &block.lines {
                    line.render(out);
                }
            }
        }
    }

    fn last_line_mut(&mut self) -> Option<&mut Line> {
        match self {
            Item::Line(line) => Some(line),
            Item::Block(block) => block.lines.last_mut(),
        }
    }
}

/// A parsed instruction file that can be edited and written back without
/// disturbing formatting outside the edited values.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    path: PathBuf,
    items: Vec<Item>,
    ending: LineEnding,
}

impl ParsedFile {
    pub fn parse(content: &str, path: impl Into<PathBuf>) -> Result<Self, InsError> {
        let path = path.into();
        let lines = split_lines(content);
        let ending = dominant_ending(&lines);
        let mut items = Vec::new();

        let mut index = 0;
        while index < lines.len() {
            let (text, line_ending) = lines[index];
            let number = index + 1;
            if let Some((kind, name, open_end)) = block_header(text)? {
                let (block, next) = parse_block(&path, &lines, index, kind, name, open_end)?;
                items.push(Item::Block(block));
                index = next;
                continue;
            }

            let code = &text[..find_comment(text).unwrap_or(text.len())];
            if paren_balance(code) != 0 {
                return Err(parse_error(
                    &path,
                    number,
                    "unbalanced parenthesis outside of a block",
                ));
            }
            items.push(Item::Line(Line {
                number: Some(number),
                segments: segment_line(text, 0, number),
                ending: line_ending,
            }));
            index += 1;
        }

        Ok(Self {
            path,
            items,
            ending,
        })
    }

    /// Reads, normalises and parses an instruction file.
    pub fn from_file(path: &Path) -> Result<Self, InsError> {
        let normalised = normalise(path)?;
        Self::parse(&normalised.content, path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn line_ending(&self) -> LineEnding {
        self.ending
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.items.iter().filter_map(|item| match item {
            Item::Block(block) => Some(block),
            Item::Line(_) => None,
        })
    }

    pub fn block(&self, kind: &str, name: &str) -> Option<&Block> {
        self.blocks()
            .filter(|block| block.kind == kind && block.name == name)
            .last()
    }

    pub fn generate(&self) -> String {
        let mut out = String::new();
        for item in &self.items {
            item.render(&mut out);
        }
        out
    }

    pub fn block_parameter(
        &self,
        kind: &str,
        name: &str,
        parameter: &str,
    ) -> Option<&InstructionParameter> {
        self.blocks()
            .filter(|block| block.kind == kind && block.name == name)
            .filter_map(|block| block.parameter(parameter))
            .last()
    }

    pub fn block_parameter_value(&self, kind: &str, name: &str, parameter: &str) -> Option<&str> {
        self.block_parameter(kind, name, parameter)
            .map(InstructionParameter::as_str)
    }

    pub fn top_level_parameter(&self, name: &str) -> Option<&InstructionParameter> {
        self.top_level_lines()
            .flat_map(Line::parameters)
            .filter(|occurrence| occurrence.name == name)
            .last()
            .map(ParameterOccurrence::value)
    }

    pub fn top_level_parameter_value(&self, name: &str) -> Option<&str> {
        self.top_level_parameter(name).map(InstructionParameter::as_str)
    }

    /// `Ok(None)` when the parameter is absent, an error when it is present
    /// but not a number.
    pub fn block_parameter_f64(
        &self,
        kind: &str,
        name: &str,
        parameter: &str,
    ) -> Result<Option<f64>, InsError> {
        self.block_parameter(kind, name, parameter)
            .map(InstructionParameter::as_f64)
            .transpose()
    }

    pub fn top_level_parameter_f64(&self, name: &str) -> Result<Option<f64>, InsError> {
        self.top_level_parameter(name)
            .map(InstructionParameter::as_f64)
            .transpose()
    }

    pub fn top_level_parameter_i64(&self, name: &str) -> Result<Option<i64>, InsError> {
        self.top_level_parameter(name)
            .map(InstructionParameter::as_i64)
            .transpose()
    }

    pub fn apply_factor(&mut self, factor: &Factor) -> Result<(), InsError> {
        factor.apply(self)
    }

    /// Rewrites the last occurrence of a block parameter, or appends it before
    /// the block's closing line when absent.
    pub fn set_block_parameter_value(
        &mut self,
        kind: &str,
        name: &str,
        parameter: &str,
        value: &str,
    ) -> Result<(), InsError> {
        let ending = self.ending;
        let block = self
            .target_block_mut(kind, name, parameter)
            .ok_or_else(|| InsError::UnknownBlock {
                kind: Some(kind.to_string()),
                name: name.to_string(),
            })?;
        block.set(parameter, value, ending)
    }

    /// Like [`ParsedFile::set_block_parameter_value`], with the block type
    /// looked up from its name.
    pub fn set_block_parameter_by_name(
        &mut self,
        name: &str,
        parameter: &str,
        value: &str,
    ) -> Result<(), InsError> {
        let mut kinds: Vec<&str> = self
            .blocks()
            .filter(|block| block.name == name)
            .map(Block::kind)
            .collect();
        kinds.sort_unstable();
        kinds.dedup();
        let kind = match kinds.as_slice() {
            [] => {
                return Err(InsError::UnknownBlock {
                    kind: None,
                    name: name.to_string(),
                })
            }
            [kind] => kind.to_string(),
            _ => {
                return Err(InsError::AmbiguousBlock {
                    name: name.to_string(),
                    kinds: kinds.iter().map(|kind| kind.to_string()).collect(),
                })
            }
        };
        self.set_block_parameter_value(&kind, name, parameter, value)
    }

    /// Rewrites the last top-level occurrence of a parameter, or appends it at
    /// the end of the file when absent.
    pub fn set_top_level_parameter_value(&mut self, name: &str, value: &str) {
        let lines = self.items.iter_mut().filter_map(|item| match item {
            Item::Line(line) => Some(line),
            Item::Block(_) => None,
        });
        if let Some(occurrence) = last_occurrence_mut(lines, name) {
            occurrence.set_value(value);
            return;
        }

        let mut ending = self.ending;
        if let Some(last) = self.items.last_mut().and_then(Item::last_line_mut) {
            if last.ending == LineEnding::None {
                last.ending = self.ending;
                ending = LineEnding::None;
            }
        }
        self.items.push(Item::Line(Line {
            number: None,
            segments: vec![Segment::Parameter(ParameterOccurrence::new(name, value))],
            ending,
        }));
    }

    pub fn is_pft(&self, name: &str) -> bool {
        self.block(PFT_BLOCK, name).is_some()
    }

    pub fn pft_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for block in self.blocks().filter(|block| block.kind == PFT_BLOCK) {
            if !names.contains(&block.name()) {
                names.push(block.name());
            }
        }
        names
    }

    pub fn enable_pft(&mut self, name: &str) -> Result<(), InsError> {
        if !self.is_pft(name) {
            return Err(InsError::UnknownPft {
                name: name.to_string(),
                path: self.path.clone(),
            });
        }
        self.set_block_parameter_value(PFT_BLOCK, name, INCLUDE_PARAMETER, "1")
    }

    pub fn disable_all_pfts(&mut self) -> Result<(), InsError> {
        let ending = self.ending;
        for item in &mut self.items {
            if let Item::Block(block) = item {
                if block.kind == PFT_BLOCK {
                    block.set(INCLUDE_PARAMETER, "0", ending)?;
                }
            }
        }
        Ok(())
    }

    fn top_level_lines(&self) -> impl Iterator<Item = &Line> {
        self.items.iter().filter_map(|item| match item {
            Item::Line(line) => Some(line),
            Item::Block(_) => None,
        })
    }

    /// The last matching block that defines `parameter`, else the last
    /// matching block.
    fn target_block_mut(&mut self, kind: &str, name: &str, parameter: &str) -> Option<&mut Block> {
        let matching: Vec<usize> = self
            .items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| match item {
                Item::Block(block) if block.kind == kind && block.name == name => Some(index),
                _ => None,
            })
            .collect();
        let target = matching
            .iter()
            .rev()
            .find(|&&index| match &self.items[index] {
                Item::Block(block) => block.contains(parameter),
                Item::Line(_) => false,
            })
            .or(matching.last())
            .copied()?;
        match &mut self.items[target] {
            Item::Block(block) => Some(block),
            Item::Line(_) => None,
        }
    }
}

fn parse_error(path: &Path, line: usize, message: &str) -> InsError {
    InsError::Parse {
        path: path.to_path_buf(),
        line,
        message: message.to_string(),
    }
}

fn parse_block(
    path: &Path,
    lines: &[(&str, LineEnding)],
    start: usize,
    kind: String,
    name: String,
    open_end: usize,
) -> Result<(Block, usize), InsError> {
    let (header, header_ending) = lines[start];
    let code = &header[..find_comment(header).unwrap_or(header.len())];
    let mut depth = paren_balance(code);
    let mut block_lines = vec![Line {
        number: Some(start + 1),
        segments: segment_line(header, open_end, start + 1),
        ending: header_ending,
    }];

    let mut index = start + 1;
    while depth > 0 {
        let Some(&(text, ending)) = lines.get(index) else {
            return Err(parse_error(
                path,
                start + 1,
                &format!("block {kind} \"{name}\" is never closed"),
            ));
        };
        let number = index + 1;
        let code = &text[..find_comment(text).unwrap_or(text.len())];
        depth += paren_balance(code);
        if depth < 0 {
            return Err(parse_error(path, number, "unexpected closing parenthesis"));
        }
        block_lines.push(Line {
            number: Some(number),
            segments: segment_line(text, 0, number),
            ending,
        });
        index += 1;
    }

    Ok((
        Block {
            kind,
            name,
            lines: block_lines,
        },
        index,
    ))
}

fn block_header(text: &str) -> Result<Option<(String, String, usize)>, InsError> {
    static HEADER: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    let header = HEADER
        .get_or_init(|| Regex::new(r#"^\s*([A-Za-z_][A-Za-z0-9_]*)\s+"([^"]*)"\s*\("#))
        .as_ref()
        .map_err(|err| InsError::Pattern(err.clone()))?;
    let code = &text[..find_comment(text).unwrap_or(text.len())];
    let Some(captures) = header.captures(code) else {
        return Ok(None);
    };
    Ok(captures.get(0).zip(captures.get(1)).zip(captures.get(2)).map(
        |((whole, kind), name)| {
            (
                kind.as_str().to_string(),
                name.as_str().to_string(),
                whole.end(),
            )
        },
    ))
}

fn split_lines(content: &str) -> Vec<(&str, LineEnding)> {
    content
        .split_inclusive('\n')
        .map(|chunk| {
            if let Some(text) = chunk.strip_suffix("\r\n") {
                (text, LineEnding::CrLf)
            } else if let Some(text) = chunk.strip_suffix('\n') {
                (text, LineEnding::Lf)
            } else {
                (chunk, LineEnding::None)
            }
        })
        .collect()
}

fn dominant_ending(lines: &[(&str, LineEnding)]) -> LineEnding {
    let crlf = lines
        .iter()
        .filter(|(_, ending)| *ending == LineEnding::CrLf)
        .count();
    let lf = lines
        .iter()
        .filter(|(_, ending)| *ending == LineEnding::Lf)
        .count();
    if crlf > lf {
        LineEnding::CrLf
    } else {
        LineEnding::Lf
    }
}

/// Net parenthesis depth change of `code`, ignoring quoted text.
fn paren_balance(code: &str) -> i64 {
    let mut in_quotes = false;
    let mut balance = 0;
    for ch in code.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '(' if !in_quotes => balance += 1,
            ')' if !in_quotes => balance -= 1,
            _ => {}
        }
    }
    balance
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Word,
    Quoted,
    Open,
    Close,
}

#[derive(Debug, Clone, Copy)]
struct Token {
    kind: TokenKind,
    start: usize,
    end: usize,
}

impl Token {
    fn text(self, line: &str) -> &str {
        &line[self.start..self.end]
    }

    fn is_value(self) -> bool {
        matches!(self.kind, TokenKind::Word | TokenKind::Quoted)
    }
}

fn tokenize(text: &str, from: usize, to: usize) -> Vec<Token> {
    let region = &text[from..to];
    let mut tokens = Vec::new();
    let mut chars = region.char_indices().peekable();
    while let Some((offset, ch)) = chars.next() {
        let start = from + offset;
        match ch {
            c if c.is_whitespace() => {}
            '(' | ')' => tokens.push(Token {
                kind: if ch == '(' {
                    TokenKind::Open
                } else {
                    TokenKind::Close
                },
                start,
                end: start + 1,
            }),
            '"' => {
                let mut end = to;
                for (next, c) in chars.by_ref() {
                    if c == '"' {
                        end = from + next + 1;
                        break;
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Quoted,
                    start,
                    end,
                });
            }
            _ => {
                let mut end = start + ch.len_utf8();
                while let Some(&(next, c)) = chars.peek() {
                    if c.is_whitespace() || matches!(c, '"' | '(' | ')') {
                        break;
                    }
                    end = from + next + c.len_utf8();
                    chars.next();
                }
                tokens.push(Token {
                    kind: TokenKind::Word,
                    start,
                    end,
                });
            }
        }
    }
    tokens
}

fn is_identifier(word: &str) -> bool {
    let mut chars = word.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_number(word: &str) -> bool {
    word.parse::<f64>().is_ok()
}

/// Splits a line into text and parameter segments, scanning from byte offset
/// `from` up to the first unquoted comment marker.
///
/// A value is a quoted string or a run of numbers, after which a new
/// `name value` pair may follow on the same line; an unquoted non-numeric
/// value runs to the end of the line (or the next parenthesis).
fn segment_line(text: &str, from: usize, number: usize) -> Vec<Segment> {
    let to = find_comment(text).unwrap_or(text.len()).max(from);
    let tokens = tokenize(text, from, to);

    let mut segments = Vec::new();
    let mut cursor = 0;
    let mut index = 0;
    while index < tokens.len() {
        let name = tokens[index];
        let starts_parameter = name.kind == TokenKind::Word
            && is_identifier(name.text(text))
            && tokens.get(index + 1).is_some_and(|next| next.is_value());
        if !starts_parameter {
            index += 1;
            continue;
        }

        let first = index + 1;
        let mut last = first;
        let open_ended = tokens[first].kind == TokenKind::Word && !is_number(tokens[first].text(text));
        while let Some(&next) = tokens.get(last + 1) {
            if !next.is_value() {
                break;
            }
            if !open_ended
                && next.kind == TokenKind::Word
                && is_identifier(next.text(text))
                && tokens.get(last + 2).is_some_and(|after| after.is_value())
            {
                break;
            }
            last += 1;
        }

        if cursor < name.start {
            segments.push(Segment::Text(text[cursor..name.start].to_string()));
        }
        segments.push(Segment::Parameter(ParameterOccurrence {
            name: name.text(text).to_string(),
            pre_value: text[name.end..tokens[first].start].to_string(),
            value: InstructionParameter::new(&text[tokens[first].start..tokens[last].end]),
            line: Some(number),
        }));
        cursor = tokens[last].end;
        index = last + 1;
    }

    if cursor < to {
        segments.push(Segment::Text(text[cursor..to].to_string()));
    }
    if to < text.len() {
        segments.push(Segment::Text(text[to..].to_string()));
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(line: &str) -> Vec<(String, String)> {
        segment_line(line, 0, 1)
            .into_iter()
            .filter_map(|segment| match segment {
                Segment::Parameter(occurrence) => Some((
                    occurrence.name().to_string(),
                    occurrence.value().raw().to_string(),
                )),
                Segment::Text(_) => None,
            })
            .collect()
    }

    #[test]
    fn segments_cover_the_line() {
        let line = "  g0 0.161   pathway \"c3\" ! trailing (comment)";
        let mut out = String::new();
        for segment in segment_line(line, 0, 1) {
            match segment {
                Segment::Text(text) => out.push_str(&text),
                Segment::Parameter(occurrence) => occurrence.render(&mut out),
            }
        }
        assert_eq!(out, line);
    }

    #[test]
    fn splits_several_parameters_on_one_line() {
        assert_eq!(
            names("g0 0.161 pathway \"c3\""),
            vec![
                ("g0".to_string(), "0.161".to_string()),
                ("pathway".to_string(), "\"c3\"".to_string())
            ]
        );
    }

    #[test]
    fn unquoted_text_value_runs_to_end() {
        assert_eq!(
            names("title my first run ! note"),
            vec![("title".to_string(), "my first run".to_string())]
        );
        assert_eq!(
            names("eps_mon 0.1 0.2 0.3"),
            vec![("eps_mon".to_string(), "0.1 0.2 0.3".to_string())]
        );
    }

    #[test]
    fn header_detection_ignores_comments() {
        let header = |text: &str| block_header(text).expect("header pattern");
        assert!(header("group \"C3G\" (").is_some());
        assert!(header("!st \"Urban\" (").is_none());
        assert!(header("group \"C3G\" ! (").is_none());
    }

    #[test]
    fn balance_ignores_quoted_parens() {
        assert_eq!(paren_balance("title \"(a\" ("), 1);
        assert_eq!(paren_balance(")"), -1);
    }
}
