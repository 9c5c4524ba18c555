//! Core data model: terms, term identifiers, quads, and scan patterns.

use std::fmt;

/// The `xsd:string` datatype IRI, the implicit datatype of plain literals.
pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";

/// Identifier kind encoded in the two low-order bits of a [`TermId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TermKind {
    /// An IRI reference.
    Iri = 0,
    /// A literal (plain, language-tagged, or typed).
    Literal = 1,
    /// A blank node.
    BlankNode = 2,
    /// Reserved kind whose payload is opaque to the store.
    Pointer = 3,
}

impl TermKind {
    fn from_tag(tag: u64) -> TermKind {
        match tag & 0x3 {
            0 => TermKind::Iri,
            1 => TermKind::Literal,
            2 => TermKind::BlankNode,
            _ => TermKind::Pointer,
        }
    }
}

/// A 64-bit term identifier.
///
/// The two low bits carry the [`TermKind`] tag; the remaining 62 bits hold
/// the serial number of the term in the term table, except for
/// [`TermKind::Pointer`] IDs whose payload is application-defined and never
/// resolves to a stored term.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct TermId(pub u64);

/// Sentinel meaning "no such term". Never stored and never emitted by scans.
pub const UNKNOWN_ID: TermId = TermId(u64::MAX);

/// Sentinel graph ID for the default graph. Not a term ID: serial numbers
/// start at 1, so no stored term ever resolves to 0.
pub const DEFAULT_GRAPH_ID: TermId = TermId(0);

impl TermId {
    /// Builds an ID from a table serial number and a kind tag.
    pub fn from_serial(serial: u64, kind: TermKind) -> TermId {
        TermId(serial << 2 | kind as u64)
    }

    /// Builds a reserved-kind ID carrying an opaque payload.
    pub fn pointer(payload: u64) -> TermId {
        TermId(payload << 2 | TermKind::Pointer as u64)
    }

    /// The kind tag of this ID.
    pub fn kind(self) -> TermKind {
        TermKind::from_tag(self.0)
    }

    /// The term-table serial number (or opaque payload for pointer IDs).
    pub fn serial(self) -> u64 {
        self.0 >> 2
    }

    pub fn is_unknown(self) -> bool {
        self == UNKNOWN_ID
    }

    /// True for the default-graph sentinel.
    pub fn is_default_graph(self) -> bool {
        self == DEFAULT_GRAPH_ID
    }
}

impl fmt::Display for TermId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An RDF-like term as interned by the term store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    /// An IRI, stored split into an interned namespace and a local name.
    Iri(String),
    /// A blank node label.
    BlankNode(String),
    /// A literal with optional language tag and optional datatype IRI.
    Literal {
        label: String,
        lang: Option<String>,
        datatype: Option<String>,
    },
}

impl Term {
    pub fn iri(value: impl Into<String>) -> Term {
        Term::Iri(value.into())
    }

    pub fn bnode(label: impl Into<String>) -> Term {
        Term::BlankNode(label.into())
    }

    /// A plain literal without language tag or datatype.
    pub fn literal(label: impl Into<String>) -> Term {
        Term::Literal {
            label: label.into(),
            lang: None,
            datatype: None,
        }
    }

    pub fn literal_lang(label: impl Into<String>, lang: impl Into<String>) -> Term {
        Term::Literal {
            label: label.into(),
            lang: Some(lang.into()),
            datatype: None,
        }
    }

    pub fn literal_typed(label: impl Into<String>, datatype: impl Into<String>) -> Term {
        Term::Literal {
            label: label.into(),
            lang: None,
            datatype: Some(datatype.into()),
        }
    }

    /// The identifier kind this term interns under.
    pub fn kind(&self) -> TermKind {
        match self {
            Term::Iri(_) => TermKind::Iri,
            Term::BlankNode(_) => TermKind::BlankNode,
            Term::Literal { .. } => TermKind::Literal,
        }
    }
}

/// A quad of term IDs in subject, predicate, object, graph order.
///
/// `graph == DEFAULT_GRAPH_ID` denotes the default graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Quad {
    pub subject: TermId,
    pub predicate: TermId,
    pub object: TermId,
    pub graph: TermId,
}

impl Quad {
    pub fn new(subject: TermId, predicate: TermId, object: TermId, graph: TermId) -> Quad {
        Quad {
            subject,
            predicate,
            object,
            graph,
        }
    }

    /// Raw field values in S,P,O,C order.
    pub fn ids(&self) -> [u64; 4] {
        [
            self.subject.0,
            self.predicate.0,
            self.object.0,
            self.graph.0,
        ]
    }

    pub fn from_ids(ids: [u64; 4]) -> Quad {
        Quad {
            subject: TermId(ids[0]),
            predicate: TermId(ids[1]),
            object: TermId(ids[2]),
            graph: TermId(ids[3]),
        }
    }
}

/// A scan pattern: four optional constants in S,P,O,C order.
///
/// `None` is a wildcard. A pattern containing [`UNKNOWN_ID`] matches nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuadPattern {
    pub subject: Option<TermId>,
    pub predicate: Option<TermId>,
    pub object: Option<TermId>,
    pub graph: Option<TermId>,
}

impl QuadPattern {
    /// The all-wildcard pattern.
    pub fn any() -> QuadPattern {
        QuadPattern::default()
    }

    pub fn new(
        subject: Option<TermId>,
        predicate: Option<TermId>,
        object: Option<TermId>,
        graph: Option<TermId>,
    ) -> QuadPattern {
        QuadPattern {
            subject,
            predicate,
            object,
            graph,
        }
    }

    /// Raw field constants in S,P,O,C order.
    pub fn fields(&self) -> [Option<u64>; 4] {
        [
            self.subject.map(|id| id.0),
            self.predicate.map(|id| id.0),
            self.object.map(|id| id.0),
            self.graph.map(|id| id.0),
        ]
    }

    /// True when any bound field is the unknown sentinel.
    pub fn has_unknown(&self) -> bool {
        [self.subject, self.predicate, self.object, self.graph]
            .iter()
            .any(|f| matches!(f, Some(id) if id.is_unknown()))
    }

    /// Replaces the graph field, used when expanding graph constraints.
    pub fn with_graph(mut self, graph: TermId) -> QuadPattern {
        self.graph = Some(graph);
        self
    }

    pub fn matches(&self, quad: &Quad) -> bool {
        fn field(c: Option<TermId>, v: TermId) -> bool {
            c.map_or(true, |c| c == v)
        }
        field(self.subject, quad.subject)
            && field(self.predicate, quad.predicate)
            && field(self.object, quad.object)
            && field(self.graph, quad.graph)
    }
}

/// One of the four quad fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Subject,
    Predicate,
    Object,
    Graph,
}

impl Field {
    /// Index of the field in canonical S,P,O,C order.
    pub fn pos(self) -> usize {
        match self {
            Field::Subject => 0,
            Field::Predicate => 1,
            Field::Object => 2,
            Field::Graph => 3,
        }
    }

    /// The single-character name used in index order strings.
    pub fn symbol(self) -> char {
        match self {
            Field::Subject => 's',
            Field::Predicate => 'p',
            Field::Object => 'o',
            Field::Graph => 'c',
        }
    }

    pub fn from_symbol(c: char) -> Option<Field> {
        match c {
            's' => Some(Field::Subject),
            'p' => Some(Field::Predicate),
            'o' => Some(Field::Object),
            'c' => Some(Field::Graph),
            _ => None,
        }
    }
}
