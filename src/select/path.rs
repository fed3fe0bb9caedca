// src/select/path.rs
// =============================================================================
// Path queries: a practical subset of XPath 1.0 evaluated directly over the
// tree that `scraper` builds.
//
// Supported:
// - absolute ("/html/body") and descendant ("//div") roots, relative steps
// - ".", "..", "*", element names, "text()", "node()", "@attr", "@*"
// - axes: child, descendant, descendant-or-self, parent, self, attribute,
//   following-sibling, preceding-sibling
// - predicates: [n], [last()], [@a], [@a='v'], [@a!='v'], [name='v'],
//   [contains(x, 'v')], [starts-with(x, 'v')], [not(...)], and/or,
//   normalize-space() as an argument
// - "|" unions, returned in document order with duplicate nodes removed
//
// "a//b" is evaluated as one document-ordered walk over the descendants of
// "a". Positional predicates still count among siblings, as XPath does, so
// "//div[2]" means "every div that is the second div child of its parent".
// =============================================================================

use std::collections::{HashMap, HashSet};

use scraper::node::Text;
use scraper::ElementRef;

use super::expr::SelectorError;
use super::{Match, Scope};

#[derive(Debug, Clone)]
pub(crate) struct PathQuery {
    branches: Vec<LocationPath>,
}

#[derive(Debug, Clone)]
struct LocationPath {
    absolute: bool,
    steps: Vec<Step>,
}

#[derive(Debug, Clone)]
struct Step {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    // The abbreviated "//name" step: descendants in document order, with
    // predicates evaluated against each node's siblings.
    DescendantChild,
    Descendant,
    DescendantOrSelf,
    Parent,
    SelfNode,
    Attribute,
    FollowingSibling,
    PrecedingSibling,
}

#[derive(Debug, Clone)]
enum NodeTest {
    Name(String),
    Any,
    Text,
    Node,
}

#[derive(Debug, Clone)]
enum Predicate {
    Position(usize),
    Last,
    Filter(Cond),
}

#[derive(Debug, Clone)]
enum Cond {
    Or(Box<Cond>, Box<Cond>),
    And(Box<Cond>, Box<Cond>),
    Not(Box<Cond>),
    Exists(Operand),
    Equals {
        operand: Operand,
        literal: String,
        negated: bool,
    },
    Contains(Operand, String),
    StartsWith(Operand, String),
}

#[derive(Debug, Clone)]
enum Operand {
    Attr(String),
    Text,
    Context,
    Child(String),
    NormalizeSpace(Box<Operand>),
}

// A node visited during evaluation. `Root` stands for the document node and
// holds the `<html>` element, which is its only element child.
#[derive(Clone, Copy)]
enum Item<'a> {
    Root(ElementRef<'a>),
    Element(ElementRef<'a>),
    Text {
        text: &'a Text,
        parent: Option<ElementRef<'a>>,
    },
    Attr {
        name: &'a str,
        value: &'a str,
        owner: ElementRef<'a>,
    },
}

// Converts a tree node into an Item; comments and doctypes are skipped.
macro_rules! node_item {
    ($node:expr) => {{
        let node = $node;
        match ElementRef::wrap(node) {
            Some(el) => Some(Item::Element(el)),
            None => node.value().as_text().map(|text| Item::Text {
                text,
                parent: node.parent().and_then(ElementRef::wrap),
            }),
        }
    }};
}

fn text_str(text: &Text) -> &str {
    text
}

impl<'a> Item<'a> {
    // XPath string-value: all descendant text of an element, the text itself,
    // or the attribute value
    fn string_value(&self) -> String {
        match self {
            Item::Root(el) | Item::Element(el) => el.text().collect(),
            Item::Text { text, .. } => text_str(text).to_string(),
            Item::Attr { value, .. } => value.to_string(),
        }
    }

    fn into_match(self) -> Match<'a> {
        match self {
            Item::Root(el) | Item::Element(el) => Match::Element(el),
            Item::Text { text, .. } => Match::Value(text_str(text).to_string()),
            Item::Attr { value, .. } => Match::Value(value.to_string()),
        }
    }

    // Identity check for elements and text nodes (attributes never compare
    // equal, they are only produced by the last step)
    fn same_node(&self, other: &Item<'_>) -> bool {
        match (self, other) {
            (Item::Element(a), Item::Element(b)) => a.id() == b.id(),
            (Item::Text { text: a, .. }, Item::Text { text: b, .. }) => std::ptr::eq(*a, *b),
            _ => false,
        }
    }

    // Children of this node's parent; the document node for the root element.
    fn siblings_and_self(&self) -> Vec<Item<'a>> {
        let parent = match self {
            Item::Element(el) => el.parent().and_then(ElementRef::wrap),
            Item::Text { parent, .. } => *parent,
            _ => None,
        };
        match (parent, self) {
            (Some(parent), _) => parent.children().filter_map(|n| node_item!(n)).collect(),
            (None, Item::Element(_)) => vec![*self],
            _ => Vec::new(),
        }
    }
}

impl PathQuery {
    // Parses a full path expression, including "|" unions.
    //
    // Example:
    //   "//ul[@id='list']/li/a/@href | //nav//a/@href"
    //   -> two branches, each a list of steps
    //
    // Fails with SelectorError::Path (and the byte offset) on the first
    // thing it does not understand.
    pub(crate) fn parse(raw: &str) -> Result<Self, SelectorError> {
        if raw.trim().is_empty() {
            return Err(SelectorError::Empty);
        }

        let mut cursor = Cursor::new(raw);
        let mut branches = vec![cursor.location_path()?];
        loop {
            cursor.skip_ws();
            if cursor.eat("|") {
                branches.push(cursor.location_path()?);
            } else {
                break;
            }
        }

        cursor.skip_ws();
        if !cursor.at_end() {
            return Err(cursor.error("unexpected trailing input"));
        }

        Ok(Self { branches })
    }

    // Evaluates every branch against `scope`. A single branch keeps the
    // order its steps produced; a union is put back into document order
    pub(crate) fn evaluate<'a>(&self, scope: Scope<'a>) -> Vec<Match<'a>> {
        let mut items: Vec<Item<'a>> = self
            .branches
            .iter()
            .flat_map(|branch| branch.evaluate(scope))
            .collect();

        if self.branches.len() > 1 {
            items = document_order(scope.root_element(), items);
        }

        items.into_iter().map(Item::into_match).collect()
    }
}

// Sorts union results by their position in the tree under `html` and drops
// nodes that more than one branch selected. Attributes sort right after
// their owner element, in declaration order.
fn document_order<'a>(html: ElementRef<'a>, items: Vec<Item<'a>>) -> Vec<Item<'a>> {
    let mut elements = HashMap::new();
    let mut texts: HashMap<*const Text, usize> = HashMap::new();
    for (i, node) in html.descendants().enumerate() {
        // 0 is the document node
        let position = i + 1;
        elements.insert(node.id(), position);
        if let Some(text) = node.value().as_text() {
            texts.insert(text as *const Text, position);
        }
    }

    let key = |item: &Item<'a>| -> (usize, usize) {
        match item {
            Item::Root(_) => (0, 0),
            Item::Element(el) => (elements.get(&el.id()).copied().unwrap_or(usize::MAX), 0),
            Item::Text { text, .. } => (
                texts.get(&(*text as *const Text)).copied().unwrap_or(usize::MAX),
                0,
            ),
            Item::Attr { name, owner, .. } => {
                let slot = owner
                    .value()
                    .attrs()
                    .position(|(attr, _)| attr == *name)
                    .map_or(0, |i| i + 1);
                (elements.get(&owner.id()).copied().unwrap_or(usize::MAX), slot)
            }
        }
    };

    let mut keyed: Vec<((usize, usize), Item<'a>)> =
        items.into_iter().map(|item| (key(&item), item)).collect();
    keyed.sort_by_key(|(k, _)| *k);
    keyed.dedup_by_key(|(k, _)| *k);
    keyed.into_iter().map(|(_, item)| item).collect()
}

impl LocationPath {
    // Runs the steps left to right; each step maps the current node list to
    // the next one. Absolute paths start at the document node even when the
    // scope is a single element.
    fn evaluate<'a>(&self, scope: Scope<'a>) -> Vec<Item<'a>> {
        let start = match (self.absolute, scope) {
            (false, Scope::Element(el)) => Item::Element(el),
            _ => Item::Root(scope.root_element()),
        };

        self.steps
            .iter()
            .fold(vec![start], |context, step| step.apply(&context))
    }
}

impl Step {
    fn new(axis: Axis, test: NodeTest) -> Self {
        Self {
            axis,
            test,
            predicates: Vec::new(),
        }
    }

    // Applies this step to every context node.
    //
    // Parameters:
    //   context: the nodes the previous step produced
    //
    // Returns: the selected nodes, each one once, in the order they were
    // first reached
    fn apply<'a>(&self, context: &[Item<'a>]) -> Vec<Item<'a>> {
        let mut out = Vec::new();
        let mut seen_elements = HashSet::new();
        let mut seen_text: HashSet<*const Text> = HashSet::new();

        for item in context {
            let mut candidates: Vec<Item<'a>> = self
                .candidates(*item)
                .into_iter()
                .filter(|c| self.matches(c))
                .collect();

            if self.axis == Axis::DescendantChild {
                candidates.retain(|c| self.holds_among_siblings(c));
            } else {
                for predicate in &self.predicates {
                    candidates = predicate.filter(candidates);
                }
            }

            for candidate in candidates {
                let fresh = match candidate {
                    Item::Element(el) => seen_elements.insert(el.id()),
                    Item::Text { text, .. } => seen_text.insert(text as *const Text),
                    _ => true,
                };
                if fresh {
                    out.push(candidate);
                }
            }
        }

        out
    }

    // For the fused "//name[...]" step: does `item` pass the predicates when
    // they are evaluated among its own siblings?
    //
    // Example:
    //   //li[2] on <ul><li>a</li><li>b</li></ul><ul><li>c</li><li>d</li></ul>
    //   -> keeps "b" and "d"
    fn holds_among_siblings(&self, item: &Item<'_>) -> bool {
        if self.predicates.is_empty() {
            return true;
        }

        let positional = self
            .predicates
            .iter()
            .any(|p| !matches!(p, Predicate::Filter(_)));
        if !positional {
            return self.predicates.iter().all(|p| match p {
                Predicate::Filter(cond) => cond.holds(item),
                _ => true,
            });
        }

        let mut siblings: Vec<Item<'_>> = item
            .siblings_and_self()
            .into_iter()
            .filter(|s| self.matches(s))
            .collect();
        for predicate in &self.predicates {
            siblings = predicate.filter(siblings);
        }
        siblings.iter().any(|s| s.same_node(item))
    }

    // Every node reachable from `item` along this step's axis, before the
    // node test and predicates are applied
    fn candidates<'a>(&self, item: Item<'a>) -> Vec<Item<'a>> {
        match (self.axis, item) {
            (Axis::SelfNode, _) => vec![item],

            (Axis::Child, Item::Root(html)) => vec![Item::Element(html)],
            (Axis::Child, Item::Element(el)) => {
                el.children().filter_map(|n| node_item!(n)).collect()
            }

            (Axis::Descendant | Axis::DescendantChild, Item::Root(html)) => {
                html.descendants().filter_map(|n| node_item!(n)).collect()
            }
            (Axis::Descendant | Axis::DescendantChild, Item::Element(el)) => el
                .descendants()
                .skip(1)
                .filter_map(|n| node_item!(n))
                .collect(),

            (Axis::DescendantOrSelf, Item::Root(html)) => std::iter::once(item)
                .chain(html.descendants().filter_map(|n| node_item!(n)))
                .collect(),
            (Axis::DescendantOrSelf, Item::Element(el)) => {
                el.descendants().filter_map(|n| node_item!(n)).collect()
            }
            (Axis::DescendantOrSelf, _) => vec![item],

            (Axis::Parent, Item::Element(el)) => el
                .parent()
                .and_then(ElementRef::wrap)
                .map(Item::Element)
                .into_iter()
                .collect(),
            (Axis::Parent, Item::Text { parent, .. }) => {
                parent.map(Item::Element).into_iter().collect()
            }
            (Axis::Parent, Item::Attr { owner, .. }) => vec![Item::Element(owner)],

            (Axis::Attribute, Item::Element(el)) => el
                .value()
                .attrs()
                .map(|(name, value)| Item::Attr {
                    name,
                    value,
                    owner: el,
                })
                .collect(),

            (Axis::FollowingSibling, Item::Element(el)) => {
                el.next_siblings().filter_map(|n| node_item!(n)).collect()
            }
            (Axis::PrecedingSibling, Item::Element(el)) => {
                el.prev_siblings().filter_map(|n| node_item!(n)).collect()
            }

            _ => Vec::new(),
        }
    }

    // The node test. Names compare case-insensitively, as HTML tag and
    // attribute names do.
    fn matches(&self, item: &Item<'_>) -> bool {
        if self.axis == Axis::Attribute {
            return match (&self.test, item) {
                (NodeTest::Name(wanted), Item::Attr { name, .. }) => {
                    name.eq_ignore_ascii_case(wanted)
                }
                (NodeTest::Any | NodeTest::Node, Item::Attr { .. }) => true,
                _ => false,
            };
        }

        match (&self.test, item) {
            (NodeTest::Node, _) => true,
            (NodeTest::Text, Item::Text { .. }) => true,
            (NodeTest::Any, Item::Element(_)) => true,
            (NodeTest::Name(wanted), Item::Element(el)) => {
                el.value().name().eq_ignore_ascii_case(wanted)
            }
            _ => false,
        }
    }
}

impl Predicate {
    // Positions are 1-based and count only the candidates that survived the
    // node test
    fn filter<'a>(&self, candidates: Vec<Item<'a>>) -> Vec<Item<'a>> {
        match self {
            Predicate::Position(n) => candidates.into_iter().nth(n - 1).into_iter().collect(),
            Predicate::Last => candidates.into_iter().last().into_iter().collect(),
            Predicate::Filter(cond) => candidates
                .into_iter()
                .filter(|item| cond.holds(item))
                .collect(),
        }
    }
}

impl Cond {
    fn holds(&self, item: &Item<'_>) -> bool {
        match self {
            Cond::Or(a, b) => a.holds(item) || b.holds(item),
            Cond::And(a, b) => a.holds(item) && b.holds(item),
            Cond::Not(inner) => !inner.holds(item),
            Cond::Exists(operand) => !operand.values(item).is_empty(),
            Cond::Equals {
                operand,
                literal,
                negated,
            } => operand
                .values(item)
                .iter()
                .any(|value| (value == literal) != *negated),
            Cond::Contains(operand, needle) => operand.first(item).contains(needle.as_str()),
            Cond::StartsWith(operand, prefix) => {
                operand.first(item).starts_with(prefix.as_str())
            }
        }
    }
}

impl Operand {
    // All string values the operand names for `item`. Most are empty or
    // a single value; text() and child names can give several.
    fn values(&self, item: &Item<'_>) -> Vec<String> {
        match (self, item) {
            (Operand::Context, _) => vec![item.string_value()],
            (Operand::Attr(name), Item::Element(el)) => {
                el.value().attr(name).map(str::to_string).into_iter().collect()
            }
            (Operand::Text, Item::Element(el)) => el
                .children()
                .filter_map(|n| n.value().as_text().map(|t| text_str(t).to_string()))
                .collect(),
            (Operand::Text, Item::Text { text, .. }) => vec![text_str(text).to_string()],
            (Operand::Child(name), Item::Element(el)) => el
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|child| child.value().name().eq_ignore_ascii_case(name))
                .map(|child| child.text().collect())
                .collect(),
            (Operand::NormalizeSpace(inner), _) => {
                vec![inner.first(item).split_whitespace().collect::<Vec<_>>().join(" ")]
            }
            _ => Vec::new(),
        }
    }

    // XPath string() of a node-set: the value of its first node, or "".
    fn first(&self, item: &Item<'_>) -> String {
        self.values(item).into_iter().next().unwrap_or_default()
    }
}

// Recursive-descent parser over the raw path string.
struct Cursor<'s> {
    src: &'s str,
    pos: usize,
}

impl<'s> Cursor<'s> {
    fn new(src: &'s str) -> Self {
        Self { src, pos: 0 }
    }

    fn error(&self, reason: &str) -> SelectorError {
        SelectorError::Path {
            expr: self.src.to_string(),
            offset: self.pos,
            reason: reason.to_string(),
        }
    }

    fn rest(&self) -> &'s str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> Result<(), SelectorError> {
        self.skip_ws();
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", token)))
        }
    }

    // Consumes `word` only when it is a whole keyword, not a name prefix.
    fn eat_keyword(&mut self, word: &str) -> bool {
        self.skip_ws();
        let Some(after) = self.rest().strip_prefix(word) else {
            return false;
        };
        if after.chars().next().map_or(true, |c| !is_name_char(c)) {
            self.pos += word.len();
            true
        } else {
            false
        }
    }

    fn name(&mut self) -> Result<&'s str, SelectorError> {
        let rest = self.rest();
        let len = rest
            .char_indices()
            .find(|(_, c)| !is_name_char(*c))
            .map_or(rest.len(), |(i, _)| i);
        if len == 0 {
            return Err(self.error("expected a name"));
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    // Consumes "()" (whitespace allowed); leaves the cursor alone otherwise
    fn empty_call(&mut self) -> bool {
        let start = self.pos;
        self.skip_ws();
        if self.eat("(") {
            self.skip_ws();
            if self.eat(")") {
                return true;
            }
        }
        self.pos = start;
        false
    }

    // A quoted string or a bare number.
    //
    // Example:
    //   'Featured Tracks'  -> Featured Tracks
    //   "a'b"              -> a'b
    //   3                  -> 3
    fn literal(&mut self) -> Result<String, SelectorError> {
        self.skip_ws();
        match self.peek() {
            Some(quote @ ('\'' | '"')) => {
                self.pos += 1;
                let rest = self.rest();
                let end = rest
                    .find(quote)
                    .ok_or_else(|| self.error("unterminated string literal"))?;
                self.pos += end + 1;
                Ok(rest[..end].to_string())
            }
            Some(c) if c.is_ascii_digit() => {
                let rest = self.rest();
                let len = rest
                    .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                    .unwrap_or(rest.len());
                self.pos += len;
                Ok(rest[..len].to_string())
            }
            _ => Err(self.error("expected a string literal")),
        }
    }

    // One branch of a union: an optional "/" or "//" root followed by steps
    // separated by "/" or "//"
    fn location_path(&mut self) -> Result<LocationPath, SelectorError> {
        self.skip_ws();
        let mut steps = Vec::new();

        let absolute = if self.eat("//") {
            self.descendant_steps(&mut steps)?;
            true
        } else if self.eat("/") {
            self.skip_ws();
            if self.at_end() || self.peek() == Some('|') {
                return Ok(LocationPath {
                    absolute: true,
                    steps,
                });
            }
            steps.push(self.step()?);
            true
        } else {
            steps.push(self.step()?);
            false
        };

        loop {
            self.skip_ws();
            if self.eat("//") {
                self.descendant_steps(&mut steps)?;
            } else if self.eat("/") {
                steps.push(self.step()?);
            } else {
                break;
            }
        }

        Ok(LocationPath { absolute, steps })
    }

    // The step after "//". Child steps fuse into a single descendant walk;
    // anything else ("//@href", "//..") keeps the explicit
    // descendant-or-self::node() step in front of it.
    fn descendant_steps(&mut self, steps: &mut Vec<Step>) -> Result<(), SelectorError> {
        let mut step = self.step()?;
        if step.axis == Axis::Child {
            step.axis = Axis::DescendantChild;
        } else {
            steps.push(Step::new(Axis::DescendantOrSelf, NodeTest::Node));
        }
        steps.push(step);
        Ok(())
    }

    // A single step with its predicates.
    //
    // Accepted forms:
    //   ..  .  @name  @*  *  name  text()  node()  axis::test
    //   followed by any number of [predicate]
    fn step(&mut self) -> Result<Step, SelectorError> {
        self.skip_ws();

        let mut step = if self.eat("..") {
            Step::new(Axis::Parent, NodeTest::Node)
        } else if self.eat(".") {
            Step::new(Axis::SelfNode, NodeTest::Node)
        } else if self.eat("@") {
            Step::new(Axis::Attribute, self.node_test()?)
        } else if self.eat("*") {
            Step::new(Axis::Child, NodeTest::Any)
        } else {
            let start = self.pos;
            let name = self.name()?;
            if self.eat("::") {
                let axis = axis_named(name).ok_or_else(|| {
                    self.pos = start;
                    self.error(&format!("unsupported axis '{}'", name))
                })?;
                Step::new(axis, self.node_test()?)
            } else {
                self.pos = start;
                Step::new(Axis::Child, self.node_test()?)
            }
        };

        loop {
            self.skip_ws();
            if !self.eat("[") {
                break;
            }
            step.predicates.push(self.predicate()?);
            self.expect("]")?;
        }

        Ok(step)
    }

    fn node_test(&mut self) -> Result<NodeTest, SelectorError> {
        if self.eat("*") {
            return Ok(NodeTest::Any);
        }
        let name = self.name()?;
        match name {
            "text" if self.empty_call() => Ok(NodeTest::Text),
            "node" if self.empty_call() => Ok(NodeTest::Node),
            _ => Ok(NodeTest::Name(name.to_string())),
        }
    }

    // The inside of "[...]": a position, last(), or a boolean condition
    fn predicate(&mut self) -> Result<Predicate, SelectorError> {
        self.skip_ws();
        let start = self.pos;

        if matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            let digits = self.literal()?;
            self.skip_ws();
            if self.peek() == Some(']') {
                return match digits.parse::<usize>() {
                    Ok(n) if n >= 1 => Ok(Predicate::Position(n)),
                    _ => Err(self.error("positions start at 1")),
                };
            }
            self.pos = start;
        }

        if self.eat_keyword("last") && self.empty_call() {
            self.skip_ws();
            if self.peek() == Some(']') {
                return Ok(Predicate::Last);
            }
        }
        self.pos = start;

        Ok(Predicate::Filter(self.or_cond()?))
    }

    fn or_cond(&mut self) -> Result<Cond, SelectorError> {
        let mut cond = self.and_cond()?;
        while self.eat_keyword("or") {
            cond = Cond::Or(Box::new(cond), Box::new(self.and_cond()?));
        }
        Ok(cond)
    }

    fn and_cond(&mut self) -> Result<Cond, SelectorError> {
        let mut cond = self.unary_cond()?;
        while self.eat_keyword("and") {
            cond = Cond::And(Box::new(cond), Box::new(self.unary_cond()?));
        }
        Ok(cond)
    }

    fn unary_cond(&mut self) -> Result<Cond, SelectorError> {
        self.skip_ws();
        let start = self.pos;

        if self.eat_keyword("not") {
            self.skip_ws();
            if self.eat("(") {
                let inner = self.or_cond()?;
                self.expect(")")?;
                return Ok(Cond::Not(Box::new(inner)));
            }
            self.pos = start;
        }

        if self.eat("(") {
            let inner = self.or_cond()?;
            self.expect(")")?;
            return Ok(inner);
        }

        self.comparison()
    }

    // contains(x, 'v'), starts-with(x, 'v'), x = 'v', x != 'v', or a bare x
    // that must exist
    fn comparison(&mut self) -> Result<Cond, SelectorError> {
        self.skip_ws();
        let start = self.pos;

        if let Ok(name) = self.name() {
            if matches!(name, "contains" | "starts-with") {
                self.skip_ws();
                if self.eat("(") {
                    let operand = self.operand()?;
                    self.expect(",")?;
                    let literal = self.literal()?;
                    self.expect(")")?;
                    return Ok(if name == "contains" {
                        Cond::Contains(operand, literal)
                    } else {
                        Cond::StartsWith(operand, literal)
                    });
                }
            }
        }
        self.pos = start;

        let operand = self.operand()?;
        self.skip_ws();
        if self.eat("!=") {
            Ok(Cond::Equals {
                operand,
                literal: self.literal()?,
                negated: true,
            })
        } else if self.eat("=") {
            Ok(Cond::Equals {
                operand,
                literal: self.literal()?,
                negated: false,
            })
        } else {
            Ok(Cond::Exists(operand))
        }
    }

    // What a condition looks at: @attr, ".", text(), a child element name,
    // or normalize-space() around one of those
    fn operand(&mut self) -> Result<Operand, SelectorError> {
        self.skip_ws();

        if self.eat("@") {
            return Ok(Operand::Attr(self.name()?.to_string()));
        }
        if self.rest().starts_with('.') && !self.rest().starts_with("..") {
            self.pos += 1;
            return Ok(Operand::Context);
        }

        let start = self.pos;
        let name = self.name()?;
        if name == "text" && self.empty_call() {
            return Ok(Operand::Text);
        }

        self.skip_ws();
        if self.peek() == Some('(') {
            if name != "normalize-space" {
                self.pos = start;
                return Err(self.error(&format!("unsupported function '{}'", name)));
            }
            self.pos += 1;
            self.skip_ws();
            let inner = if self.peek() == Some(')') {
                Operand::Context
            } else {
                self.operand()?
            };
            self.expect(")")?;
            return Ok(Operand::NormalizeSpace(Box::new(inner)));
        }

        Ok(Operand::Child(name.to_string()))
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

fn axis_named(name: &str) -> Option<Axis> {
    match name {
        "child" => Some(Axis::Child),
        "descendant" => Some(Axis::Descendant),
        "descendant-or-self" => Some(Axis::DescendantOrSelf),
        "parent" => Some(Axis::Parent),
        "self" => Some(Axis::SelfNode),
        "attribute" => Some(Axis::Attribute),
        "following-sibling" => Some(Axis::FollowingSibling),
        "preceding-sibling" => Some(Axis::PrecedingSibling),
        _ => None,
    }
}
