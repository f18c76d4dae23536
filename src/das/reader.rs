//! Scope reader: drives the chunked stream and the grammar to build an
//! [`EntityGraph`].
//!
//! The reader keeps a small carry-over buffer holding the unconsumed tail
//! of the previous chunk. Tokens are only ever incomplete at the end of
//! that buffer, so the carry-over stays bounded by the longest text token
//! (see [`ReaderConfig::max_token_len`]). Raw payloads are copied out
//! incrementally and never need to fit in one chunk.

use std::fmt;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use tracing::{debug, warn};

use super::format::*;
use super::grammar::{
    expect_line_end, is_end_scope, next_token, read_quoted, take_fixed, Cursor, GrammarResult,
    Step, Token,
};
use super::read_util::{into_entity, FieldValue, ScopeFrame};
use super::stream::ChunkedScopeStream;
use crate::graph::EntityGraph;
use crate::util::{Error, Location, Result, MAT4_SIZE};

/// Upper bound on the initial allocation for a raw payload. Larger payloads
/// grow as bytes actually arrive.
const RAW_PREALLOC_LIMIT: usize = 1 << 20;

/// Bytes around a text token that do not count towards `max_token_len`:
/// the quote pair and line end of a string, or `: ` after a key.
const TOKEN_FRAMING: usize = 3;

// ============================================================================
// Configuration
// ============================================================================

/// Reader settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Chunk capacity of the underlying stream in bytes.
    pub chunk_capacity: usize,
    /// Recover from scope imbalance instead of failing.
    pub lenient: bool,
    /// Longest scope name, key or quoted string accepted.
    pub max_token_len: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            chunk_capacity: DEFAULT_CHUNK_CAPACITY,
            lenient: false,
            max_token_len: DEFAULT_MAX_TOKEN_LEN,
        }
    }
}

impl ReaderConfig {
    pub fn with_chunk_capacity(mut self, capacity: usize) -> Self {
        self.chunk_capacity = capacity;
        self
    }

    pub fn with_lenient(mut self, lenient: bool) -> Self {
        self.lenient = lenient;
        self
    }

    pub fn with_max_token_len(mut self, len: usize) -> Self {
        self.max_token_len = len;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.max_token_len < MAT4_SIZE {
            return Err(Error::InvalidConfig(format!(
                "max token length {} is below {} bytes",
                self.max_token_len, MAT4_SIZE
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Output
// ============================================================================

/// Recoverable problem reported in lenient mode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub at: Location,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.at)
    }
}

/// Result of a successful parse.
#[derive(Clone, Debug, Default)]
pub struct ParseOutput {
    pub graph: EntityGraph,
    pub diagnostics: Vec<Diagnostic>,
}

/// Read a DAS file with the default configuration.
pub fn read_file(path: impl AsRef<Path>) -> Result<ParseOutput> {
    read_file_with(path, ReaderConfig::default())
}

/// Read a DAS file.
#[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn read_file_with(path: impl AsRef<Path>, config: ReaderConfig) -> Result<ParseOutput> {
    ScopeReader::open(path, config)?.read()
}

/// Read a DAS stream from any seekable source.
#[tracing::instrument(skip_all)]
pub fn read_from<R: Read + Seek>(reader: R, config: ReaderConfig) -> Result<ParseOutput> {
    ScopeReader::new(reader, config)?.read()
}

// ============================================================================
// Reader
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ReadState {
    Start,
    ReadSignature,
    ReadScope,
    End,
}

/// Single-pass DAS parser.
pub struct ScopeReader<R> {
    stream: ChunkedScopeStream<R>,
    config: ReaderConfig,
    state: ReadState,

    /// Unconsumed bytes: the tail of earlier chunks plus the current one.
    pending: Vec<u8>,
    pos: usize,
    /// Absolute offset of `pending[0]`.
    base: u64,
    line: u32,
    field: Option<&'static str>,

    frames: Vec<ScopeFrame>,
    graph: EntityGraph,
    seen_properties: bool,
    diagnostics: Vec<Diagnostic>,
}

impl ScopeReader<File> {
    pub fn open(path: impl AsRef<Path>, config: ReaderConfig) -> Result<Self> {
        config.validate()?;
        let stream = ChunkedScopeStream::open_with_capacity(path, config.chunk_capacity)?;
        Ok(Self::with_stream(stream, config))
    }
}

impl<R: Read + Seek> ScopeReader<R> {
    pub fn new(inner: R, config: ReaderConfig) -> Result<Self> {
        config.validate()?;
        let stream = ChunkedScopeStream::with_capacity(inner, config.chunk_capacity)?;
        Ok(Self::with_stream(stream, config))
    }

    fn with_stream(stream: ChunkedScopeStream<R>, config: ReaderConfig) -> Self {
        Self {
            stream,
            config,
            state: ReadState::Start,
            pending: Vec::new(),
            pos: 0,
            base: 0,
            line: 1,
            field: None,
            frames: Vec::new(),
            graph: EntityGraph::default(),
            seen_properties: false,
            diagnostics: Vec::new(),
        }
    }

    /// Run the state machine to completion.
    pub fn read(mut self) -> Result<ParseOutput> {
        loop {
            self.state = match self.state {
                ReadState::Start => ReadState::ReadSignature,
                ReadState::ReadSignature => {
                    self.read_signature()?;
                    ReadState::ReadScope
                }
                ReadState::ReadScope => {
                    if self.read_token()? {
                        ReadState::ReadScope
                    } else {
                        ReadState::End
                    }
                }
                ReadState::End => return self.finish(),
            };
        }
    }

    // ------------------------------------------------------------------
    // Buffer management
    // ------------------------------------------------------------------

    fn location(&self) -> Location {
        Location {
            line: self.line,
            offset: self.base + self.pos as u64,
            scope: self.frames.last().map(|f| f.kind.name()),
            field: self.field.map(str::to_string),
        }
    }

    /// Drop consumed bytes and append the next chunk.
    fn refill(&mut self) -> Result<bool> {
        self.pending.drain(..self.pos);
        self.base += self.pos as u64;
        self.pos = 0;
        if !self.stream.read_chunk()? {
            return Ok(false);
        }
        self.pending.extend_from_slice(self.stream.buffer_view());
        Ok(true)
    }

    /// Apply a grammar function, refilling until it completes.
    fn scan<T>(
        &mut self,
        mut f: impl FnMut(&[u8], &mut Cursor, bool) -> GrammarResult<T>,
    ) -> Result<T> {
        loop {
            let at_eof = self.stream.is_exhausted();
            let mut cur = Cursor {
                pos: self.pos,
                line: self.line,
            };
            match f(&self.pending[..], &mut cur, at_eof) {
                Ok(Step::Ready(value)) => {
                    self.pos = cur.pos;
                    self.line = cur.line;
                    return Ok(value);
                }
                Ok(Step::Incomplete) => {
                    if at_eof {
                        return Err(Error::UnexpectedEof(self.location()));
                    }
                    if self.pending.len() - self.pos > self.config.max_token_len + TOKEN_FRAMING {
                        return Err(Error::syntax(
                            format!("token exceeds {} bytes", self.config.max_token_len),
                            self.location(),
                        ));
                    }
                    self.refill()?;
                }
                Err(e) => return Err(Error::syntax(e.to_string(), self.location())),
            }
        }
    }

    fn read_fixed(&mut self, n: usize) -> Result<Vec<u8>> {
        let range = self.scan(|input, cur, _| Ok(take_fixed(input, cur, n)))?;
        Ok(self.pending[range].to_vec())
    }

    /// Copy `len` payload bytes verbatim, refilling as needed.
    fn read_raw(&mut self, len: u64) -> Result<Vec<u8>> {
        let mut remaining = usize::try_from(len).map_err(|_| Error::InvalidValue {
            msg: format!("payload of {} bytes does not fit in memory", len),
            at: self.location(),
        })?;
        let mut out = Vec::with_capacity(remaining.min(RAW_PREALLOC_LIMIT));
        loop {
            let take = remaining.min(self.pending.len() - self.pos);
            out.extend_from_slice(&self.pending[self.pos..self.pos + take]);
            self.pos += take;
            remaining -= take;
            if remaining == 0 {
                return Ok(out);
            }
            if self.stream.is_exhausted() {
                return Err(Error::UnexpectedEof(self.location()));
            }
            self.refill()?;
        }
    }

    // ------------------------------------------------------------------
    // States
    // ------------------------------------------------------------------

    fn read_signature(&mut self) -> Result<()> {
        let sig = match self.read_fixed(SIGNATURE_SIZE) {
            Ok(sig) => sig,
            Err(Error::UnexpectedEof(_)) => return Err(Error::InvalidSignature),
            Err(e) => return Err(e),
        };
        if &sig[..DAS_MAGIC.len()] != DAS_MAGIC {
            return Err(Error::InvalidSignature);
        }
        match sig[FINALIZED_OFFSET] {
            FINALIZED_FLAG => {}
            NOT_FINALIZED_FLAG => return Err(Error::NotFinalized),
            _ => return Err(Error::InvalidSignature),
        }
        let version = LittleEndian::read_u16(&sig[VERSION_OFFSET..]);
        if version != CURRENT_VERSION {
            return Err(Error::UnsupportedVersion(version));
        }
        Ok(())
    }

    /// Handle one marker or field. Returns `false` at end of input.
    fn read_token(&mut self) -> Result<bool> {
        match self.scan(next_token)? {
            Token::End => {
                if !self.frames.is_empty() {
                    return Err(Error::UnexpectedEof(self.location()));
                }
                Ok(false)
            }
            Token::Marker(range) => {
                let name = self.pending[range].to_vec();
                if is_end_scope(&name) {
                    self.close_scope()?;
                } else {
                    self.open_scope(&name)?;
                }
                Ok(true)
            }
            Token::Key(range) => {
                let key = self.pending[range].to_vec();
                self.read_field(&key)?;
                Ok(true)
            }
        }
    }

    fn recover(&mut self, message: String) {
        let at = self.location();
        warn!("{} ({}), recovering", message, at);
        self.diagnostics.push(Diagnostic { message, at });
    }

    fn open_scope(&mut self, name: &[u8]) -> Result<()> {
        let Some(kind) = ScopeKind::from_name(name) else {
            return Err(Error::UnknownScope {
                name: String::from_utf8_lossy(name).into_owned(),
                at: self.location(),
            });
        };

        if kind == ScopeKind::Properties && self.seen_properties {
            return Err(Error::syntax("duplicate PROPERTIES scope", self.location()));
        }
        if kind != ScopeKind::Properties && !self.seen_properties {
            return Err(Error::syntax(
                format!("{} before PROPERTIES; PROPERTIES must be the first scope", kind.name()),
                self.location(),
            ));
        }

        let parent = kind.required_parent();
        let top = self.frames.last().map(|f| f.kind);
        let sibling_open = match parent {
            Some(p) => top != Some(p) && self.frames.iter().any(|f| f.kind == p),
            None => top.is_some(),
        };

        if sibling_open {
            let open = top.map(ScopeKind::name).unwrap_or_default();
            let message = format!("{} opened while {} is still open", kind.name(), open);
            if !self.config.lenient {
                return Err(Error::syntax(message, self.location()));
            }
            self.recover(message);
            // Close until the new scope has a valid parent.
            while self.frames.last().map(|f| f.kind) != parent {
                self.close_scope()?;
            }
        } else if let Some(p) = parent {
            if top != Some(p) {
                return Err(Error::Nesting {
                    scope: kind.name(),
                    parent: top.map(ScopeKind::name).unwrap_or("file top level"),
                    at: self.location(),
                });
            }
        }

        if kind == ScopeKind::Properties {
            self.seen_properties = true;
        }
        self.frames.push(ScopeFrame::new(kind));
        Ok(())
    }

    fn close_scope(&mut self) -> Result<()> {
        let at = self.location();
        let Some(frame) = self.frames.pop() else {
            let message = "ENDSCOPE without an open scope".to_string();
            if !self.config.lenient {
                return Err(Error::syntax(message, at));
            }
            self.recover(message);
            return Ok(());
        };

        let name = frame.kind.name();
        let at = Location {
            scope: Some(name),
            ..at
        };
        let entity = into_entity(frame, &at)?;
        debug!(scope = name, line = at.line, offset = at.offset, "scope parsed");
        match self.frames.last_mut() {
            Some(parent) => parent.children.push(entity),
            None => self.graph.insert(entity)?,
        }
        Ok(())
    }

    fn read_field(&mut self, key: &[u8]) -> Result<()> {
        let Some(kind) = self.frames.last().map(|f| f.kind) else {
            return Err(Error::syntax(
                format!("field {} outside of any scope", String::from_utf8_lossy(key)),
                self.location(),
            ));
        };
        let Some(field) = kind.field(key) else {
            return Err(Error::UnknownField {
                key: String::from_utf8_lossy(key).into_owned(),
                at: self.location(),
            });
        };

        self.field = Some(field.key);
        if self.frames.last().is_some_and(|f| f.has(field.key)) {
            return Err(Error::syntax("duplicate field", self.location()));
        }

        let value = match field.kind {
            FieldKind::Str => {
                let range = self.scan(|input, cur, _| read_quoted(input, cur))?;
                let text = String::from_utf8(self.pending[range].to_vec()).map_err(|e| {
                    Error::InvalidValue {
                        msg: e.to_string(),
                        at: self.location(),
                    }
                })?;
                FieldValue::Text(text)
            }
            FieldKind::Fixed(n) => {
                let bytes = self.read_fixed(n)?;
                self.scan(|input, cur, _| expect_line_end(input, cur))?;
                FieldValue::Bytes(bytes)
            }
            FieldKind::Sized { count_key, width } => {
                let count = self
                    .frames
                    .last()
                    .and_then(|f| f.count(count_key))
                    .ok_or_else(|| Error::MissingField {
                        field: count_key,
                        at: self.location(),
                    })?;
                let len = count.checked_mul(width as u64).ok_or_else(|| Error::InvalidValue {
                    msg: format!("{} = {} overflows", count_key, count),
                    at: self.location(),
                })?;
                let bytes = self.read_raw(len)?;
                self.scan(|input, cur, _| expect_line_end(input, cur))?;
                FieldValue::Bytes(bytes)
            }
        };

        if let Some(frame) = self.frames.last_mut() {
            frame.push(field.key, value);
        }
        self.field = None;
        Ok(())
    }

    fn finish(mut self) -> Result<ParseOutput> {
        if !self.seen_properties {
            return Err(Error::MissingField {
                field: "PROPERTIES",
                at: self.location(),
            });
        }
        if self.graph.scenes.is_empty() {
            self.graph.synthesize_default_scene();
            debug!(models = self.graph.models.len(), "synthesized default scene");
        }
        debug!(
            buffers = self.graph.buffers.len(),
            primitives = self.graph.primitives.len(),
            models = self.graph.models.len(),
            scenes = self.graph.scenes.len(),
            "parse complete"
        );
        Ok(ParseOutput {
            graph: self.graph,
            diagnostics: self.diagnostics,
        })
    }
}
