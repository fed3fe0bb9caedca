// src/crawl/pipeline.rs
// =============================================================================
// The step interpreter.
//
// Running a chain of steps over one page produces a stream of emissions:
// finished records, and sub-fetches the driver has to perform before the
// chain can go on. A sub-fetch carries its continuation (the frame to resume
// with once the linked page arrives), so the interpreter itself never waits
// on the network and never holds a page across an await.
//
// The walk keeps an explicit stack of frames instead of recursing:
//
//   Frame { steps, index, carry, outer }
//
// - index == steps.len(): the chain is complete. A top-level frame emits its
//   carry; a nested frame (one started by a follow step) merges its carry
//   into the outer frame's carry and completes the outer frame too.
// - Find: one frame per found record, each with that record as its carry.
// - Follow: one sub-fetch per linked URL, each resuming a nested frame over
//   the follow step's own steps. A follow step ends its chain: steps declared
//   after it never run, and no usable link sends the carry straight to the
//   end of the chain.
// - DynamicFind: one sub-fetch per detail link; the detail page's record
//   becomes the carry. Secondary listing pages rerun the same step.
// =============================================================================

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::debug;
use url::Url;

use super::target::{DynamicFindStep, FollowStep, Step};
use crate::extract::{self, Record};
use crate::fetch::Document;

/// A position in a step chain plus the record built so far.
#[derive(Debug, Clone)]
pub struct Frame {
    steps: Arc<[Step]>,
    index: usize,
    carry: Option<Record>,
    /// Where to continue once this (nested) chain completes.
    outer: Option<Box<Frame>>,
}

impl Frame {
    pub fn start(steps: Arc<[Step]>) -> Self {
        Self {
            steps,
            index: 0,
            carry: None,
            outer: None,
        }
    }

    fn step(&self) -> Option<&Step> {
        self.steps.get(self.index)
    }

    // The same chain one step further on, with a new carry.
    fn advance(&self, carry: Option<Record>) -> Frame {
        Frame {
            steps: Arc::clone(&self.steps),
            index: self.index + 1,
            carry,
            outer: self.outer.clone(),
        }
    }

    // The same chain at its end, so the next pop completes it with `carry`.
    fn finish(&self, carry: Option<Record>) -> Frame {
        Frame {
            steps: Arc::clone(&self.steps),
            index: self.steps.len(),
            carry,
            outer: self.outer.clone(),
        }
    }

    // A chain over `steps` whose records merge into this frame's carry,
    // which then completes this chain.
    fn nest(&self, steps: Arc<[Step]>) -> Frame {
        Frame {
            steps,
            index: 0,
            carry: None,
            outer: Some(Box::new(self.finish(self.carry.clone()))),
        }
    }
}

/// What to do with a page fetched on behalf of a step.
#[derive(Debug, Clone)]
pub enum Continuation {
    /// Run the frame's chain against the fetched page.
    Steps(Frame),
    /// The page is a detail page for the frame's dynamic-find step.
    Detail(Frame),
}

/// A page a step needs before it can continue.
#[derive(Debug, Clone)]
pub struct SubFetch {
    pub url: Url,
    /// Skip the fetch if the URL has been seen before in this crawl.
    pub dedup: bool,
    pub then: Continuation,
}

#[derive(Debug, Clone)]
pub enum Emission {
    Record(Record),
    Fetch(SubFetch),
}

/// Lazily interprets step chains against one page.
pub struct StepRunner<'d> {
    doc: &'d Document,
    attach_source: bool,
    stack: Vec<Frame>,
    pending: VecDeque<Emission>,
}

impl<'d> StepRunner<'d> {
    /// Runs `steps` from the beginning against `doc`.
    pub fn new(doc: &'d Document, steps: Arc<[Step]>, attach_source: bool) -> Self {
        Self::with_frame(doc, Frame::start(steps), attach_source)
    }

    /// Continues a chain that was waiting for `doc`.
    pub fn resume(doc: &'d Document, then: Continuation, attach_source: bool) -> Self {
        match then {
            Continuation::Steps(frame) => Self::with_frame(doc, frame, attach_source),
            Continuation::Detail(frame) => {
                let mut runner = Self {
                    doc,
                    attach_source,
                    stack: Vec::new(),
                    pending: VecDeque::new(),
                };
                if let Some(Step::DynamicFind(step)) = frame.step() {
                    let record = step.extract_detail(doc, attach_source);
                    runner.stack.push(frame.advance(Some(record)));
                }
                runner
            }
        }
    }

    fn with_frame(doc: &'d Document, frame: Frame, attach_source: bool) -> Self {
        Self {
            doc,
            attach_source,
            stack: vec![frame],
            pending: VecDeque::new(),
        }
    }

    // A chain reached its end. Top-level: emit the carry (if any). Nested:
    // merge the carry into the outer frame's carry, nested keys winning, and
    // let the outer frame finish in turn.
    //
    // Example:
    //   outer carry {title: "T", link: "/x"}, nested carry {title: "T2"}
    //   -> {title: "T2", link: "/x"}
    fn complete(&mut self, frame: Frame) {
        match frame.outer {
            None => {
                if let Some(record) = frame.carry {
                    self.pending.push_back(Emission::Record(record));
                }
            }
            Some(outer) => {
                let mut outer = *outer;
                outer.carry = match (outer.carry.take(), frame.carry) {
                    (Some(parent), Some(child)) => Some(parent.merged(&child)),
                    (parent, child) => child.or(parent),
                };
                self.stack.push(outer);
            }
        }
    }

    // One new frame per record found; the record replaces the carry
    fn run_find(&mut self, frame: &Frame, step: &extract::FindStep) {
        let source = self.attach_source.then(|| self.doc.url().to_string());
        let records: Vec<Record> =
            extract::find(self.doc.root(), step, source.as_deref()).collect();

        // Reversed so the first record is popped first.
        for record in records.into_iter().rev() {
            self.stack.push(frame.advance(Some(record)));
        }
    }

    // Reads the link field of the carry. A list value fans out into one
    // sub-fetch per URL; an absent or empty value ends the chain with the
    // carry unchanged.
    fn run_follow(&mut self, frame: &Frame, step: &FollowStep) {
        let links: Vec<Url> = frame
            .carry
            .as_ref()
            .and_then(|carry| carry.get(&step.link_field))
            .map(|value| {
                value
                    .values()
                    .into_iter()
                    .filter(|href| !href.trim().is_empty())
                    .filter_map(|href| self.doc.resolve_url(href))
                    .collect()
            })
            .unwrap_or_default();

        if links.is_empty() {
            debug!(
                "No link in field '{}' on {}, keeping record",
                step.link_field,
                self.doc.url()
            );
            self.stack.push(frame.finish(frame.carry.clone()));
            return;
        }

        for url in links {
            self.pending.push_back(Emission::Fetch(SubFetch {
                url,
                dedup: false,
                then: Continuation::Steps(frame.nest(Arc::clone(&step.next_steps))),
            }));
        }
    }

    // Detail pages come back as Continuation::Detail; further listing pages
    // rerun this same step
    fn run_dynamic_find(&mut self, frame: &Frame, step: &DynamicFindStep) {
        let details = step.detail_urls(self.doc);
        debug!("Found {} detail links on {}", details.len(), self.doc.url());

        for url in details {
            self.pending.push_back(Emission::Fetch(SubFetch {
                url,
                dedup: true,
                then: Continuation::Detail(frame.clone()),
            }));
        }

        for url in step.listing_pages(self.doc) {
            self.pending.push_back(Emission::Fetch(SubFetch {
                url,
                dedup: true,
                then: Continuation::Steps(frame.clone()),
            }));
        }
    }
}

impl Iterator for StepRunner<'_> {
    type Item = Emission;

    fn next(&mut self) -> Option<Emission> {
        loop {
            if let Some(emission) = self.pending.pop_front() {
                return Some(emission);
            }

            let frame = self.stack.pop()?;
            let steps = Arc::clone(&frame.steps);
            match steps.get(frame.index) {
                None => self.complete(frame),
                Some(Step::Find(step)) => self.run_find(&frame, step),
                Some(Step::Follow(step)) => self.run_follow(&frame, step),
                Some(Step::DynamicFind(step)) => self.run_dynamic_find(&frame, step),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{FieldValue, FindStep};
    use crate::select::SelectorExpr;
    use indexmap::IndexMap;

    fn expr(raw: &str) -> SelectorExpr {
        SelectorExpr::parse(raw).unwrap()
    }

    fn find_step(repeating: &str, fields: &[(&str, &str)], required: usize) -> Step {
        let fields: IndexMap<String, SelectorExpr> = fields
            .iter()
            .map(|(name, raw)| (name.to_string(), expr(raw)))
            .collect();
        Step::Find(FindStep::new(expr(repeating), fields).with_required(required))
    }

    fn doc(url: &str, html: &str) -> Document {
        Document::from_html(Url::parse(url).unwrap(), html)
    }

    fn records(emissions: Vec<Emission>) -> Vec<Record> {
        emissions
            .into_iter()
            .filter_map(|e| match e {
                Emission::Record(r) => Some(r),
                Emission::Fetch(_) => None,
            })
            .collect()
    }

    fn fetches(emissions: &[Emission]) -> Vec<&SubFetch> {
        emissions
            .iter()
            .filter_map(|e| match e {
                Emission::Fetch(f) => Some(f),
                Emission::Record(_) => None,
            })
            .collect()
    }

    const LISTING: &str = r#"
        <div class="row"><h3>Art</h3><a href="/x">more</a></div>
        <div class="row"><h3>Bio</h3></div>
        <div class="row"><h3>Chem</h3><a href="/z">more</a></div>
    "#;

    #[test]
    fn test_find_only_chain_emits_records_in_order() {
        let steps: Arc<[Step]> = vec![find_step("div.row", &[("title", "h3")], 1)].into();
        let page = doc("https://example.com/", LISTING);

        let titles: Vec<_> = records(StepRunner::new(&page, steps, false).collect())
            .iter()
            .map(|r| r.get("title").cloned())
            .collect();
        assert_eq!(
            titles,
            vec![Some("Art".into()), Some("Bio".into()), Some("Chem".into())]
        );
    }

    #[test]
    fn test_follow_without_link_passes_carry_through() {
        let nested: Arc<[Step]> = vec![find_step("body", &[("title", "h1")], 0)].into();
        let steps: Arc<[Step]> = vec![
            find_step("div.row", &[("title", "h3"), ("link", "a::attr(href)")], 1),
            Step::Follow(FollowStep {
                link_field: "link".to_string(),
                next_steps: nested,
            }),
        ]
        .into();
        let page = doc("https://example.com/", LISTING);

        let emissions: Vec<_> = StepRunner::new(&page, steps, false).collect();
        let fetch_urls: Vec<_> = fetches(&emissions).iter().map(|f| f.url.as_str()).collect();
        assert_eq!(fetch_urls, vec!["https://example.com/x", "https://example.com/z"]);
        assert!(fetches(&emissions).iter().all(|f| !f.dedup));

        let passed = records(emissions);
        assert_eq!(passed.len(), 1);
        assert_eq!(passed[0].get("title"), Some(&"Bio".into()));
        assert_eq!(passed[0].get("link"), None);
    }

    #[test]
    fn test_follow_merges_nested_record_right_biased() {
        let nested: Arc<[Step]> = vec![find_step("body", &[("title", "h1")], 0)].into();
        let steps: Arc<[Step]> = vec![
            find_step("div.row", &[("title", "h3"), ("link", "a::attr(href)")], 1),
            Step::Follow(FollowStep {
                link_field: "link".to_string(),
                next_steps: nested,
            }),
        ]
        .into();
        let listing = doc(
            "https://example.com/",
            r#"<div class="row"><h3>T</h3><a href="/x">more</a></div>"#,
        );

        let emissions: Vec<_> = StepRunner::new(&listing, steps, false).collect();
        let sub = fetches(&emissions)[0].clone();

        let detail = doc("https://example.com/x", "<body><h1>T2</h1></body>");
        let merged = records(StepRunner::resume(&detail, sub.then, false).collect());

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].get("title"), Some(&"T2".into()));
        assert_eq!(merged[0].get("link"), Some(&"/x".into()));
        assert_eq!(merged[0].field_names().collect::<Vec<_>>(), vec!["title", "link"]);
    }

    #[test]
    fn test_follow_with_empty_next_steps_yields_outer_record() {
        let steps: Arc<[Step]> = vec![
            find_step("div.row", &[("title", "h3"), ("link", "a::attr(href)")], 1),
            Step::Follow(FollowStep {
                link_field: "link".to_string(),
                next_steps: Vec::new().into(),
            }),
        ]
        .into();
        let listing = doc(
            "https://example.com/",
            r#"<div class="row"><h3>T</h3><a href="/x">more</a></div>"#,
        );

        let emissions: Vec<_> = StepRunner::new(&listing, steps, false).collect();
        let sub = fetches(&emissions)[0].clone();
        let linked = doc("https://example.com/x", "<p>anything</p>");

        let out = records(StepRunner::resume(&linked, sub.then, false).collect());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get("title"), Some(&"T".into()));
    }

    #[test]
    fn test_list_valued_link_fans_out() {
        let steps: Arc<[Step]> = vec![
            find_step("div.row", &[("links", "a::attr(href)")], 1),
            Step::Follow(FollowStep {
                link_field: "links".to_string(),
                next_steps: Vec::new().into(),
            }),
        ]
        .into();
        let listing = doc(
            "https://example.com/",
            r#"<div class="row"><a href="/a">a</a><a href="/b">b</a></div>"#,
        );

        let emissions: Vec<_> = StepRunner::new(&listing, steps, false).collect();
        assert_eq!(fetches(&emissions).len(), 2);
        assert!(records(emissions).is_empty());
    }

    #[test]
    fn test_nested_find_with_no_rows_drops_record() {
        let nested: Arc<[Step]> = vec![find_step("li", &[("item", "li")], 1)].into();
        let steps: Arc<[Step]> = vec![
            find_step("div.row", &[("link", "a::attr(href)")], 1),
            Step::Follow(FollowStep {
                link_field: "link".to_string(),
                next_steps: nested,
            }),
        ]
        .into();
        let listing = doc(
            "https://example.com/",
            r#"<div class="row"><a href="/x">x</a></div>"#,
        );
        let emissions: Vec<_> = StepRunner::new(&listing, steps, false).collect();
        let sub = fetches(&emissions)[0].clone();

        let empty = doc("https://example.com/x", "<p>nothing here</p>");
        assert_eq!(StepRunner::resume(&empty, sub.then, false).count(), 0);
    }

    #[test]
    fn test_follow_without_link_ends_the_chain() {
        let steps: Arc<[Step]> = vec![
            find_step("div.row", &[("title", "h3"), ("link", "a::attr(href)")], 1),
            Step::Follow(FollowStep {
                link_field: "link".to_string(),
                next_steps: Vec::new().into(),
            }),
            find_step("p.ad", &[("ad", "span")], 1),
        ]
        .into();
        let page = doc(
            "https://example.com/",
            r#"<div class="row"><h3>Bio</h3></div>
               <p class="ad"><span>buy</span></p>
               <p class="ad"><span>now</span></p>"#,
        );

        let emissions: Vec<_> = StepRunner::new(&page, steps, false).collect();
        assert!(fetches(&emissions).is_empty());

        let out = records(emissions);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get("title"), Some(&FieldValue::from("Bio")));
        assert_eq!(out[0].get("link"), None);
        assert!(!out[0].contains_field("ad"));
    }

    #[test]
    fn test_steps_after_follow_never_run() {
        let nested: Arc<[Step]> = vec![find_step("body", &[("extra", "h1")], 0)].into();
        let steps: Arc<[Step]> = vec![
            find_step("div.row", &[("link", "a::attr(href)")], 1),
            Step::Follow(FollowStep {
                link_field: "link".to_string(),
                next_steps: nested,
            }),
            find_step("p.ad", &[("ad", "span")], 1),
        ]
        .into();
        let listing = doc(
            "https://example.com/",
            r#"<div class="row"><a href="/x">x</a></div><p class="ad"><span>buy</span></p>"#,
        );
        let emissions: Vec<_> = StepRunner::new(&listing, steps, false).collect();
        assert_eq!(fetches(&emissions).len(), 1);
        let sub = fetches(&emissions)[0].clone();
        assert!(records(emissions).is_empty());

        let detail = doc(
            "https://example.com/x",
            r#"<body><h1>E</h1><p class="ad"><span>sale</span></p></body>"#,
        );
        let out = records(StepRunner::resume(&detail, sub.then, false).collect());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get("link"), Some(&FieldValue::from("/x")));
        assert_eq!(out[0].get("extra"), Some(&FieldValue::from("E")));
        assert!(!out[0].contains_field("ad"));
    }

    #[test]
    fn test_nested_follow_merges_into_every_outer_record() {
        let deepest: Arc<[Step]> = vec![find_step("body", &[("deep", "h2")], 0)].into();
        let nested: Arc<[Step]> = vec![
            find_step("body", &[("extra", "h1"), ("more", "a::attr(href)")], 0),
            Step::Follow(FollowStep {
                link_field: "more".to_string(),
                next_steps: deepest,
            }),
        ]
        .into();
        let steps: Arc<[Step]> = vec![
            find_step("div.row", &[("link", "a::attr(href)")], 1),
            Step::Follow(FollowStep {
                link_field: "link".to_string(),
                next_steps: nested,
            }),
        ]
        .into();

        let listing = doc(
            "https://example.com/",
            r#"<div class="row"><a href="/x">x</a></div>"#,
        );
        let first: Vec<_> = StepRunner::new(&listing, steps, false).collect();
        let to_x = fetches(&first)[0].clone();

        let middle = doc("https://example.com/x", r#"<body><h1>E</h1><a href="/y">y</a></body>"#);
        let second: Vec<_> = StepRunner::resume(&middle, to_x.then, false).collect();
        assert_eq!(fetches(&second).len(), 1);
        let to_y = fetches(&second)[0].clone();
        assert_eq!(to_y.url.as_str(), "https://example.com/y");
        assert!(records(second).is_empty());

        let last = doc("https://example.com/y", "<body><h2>D</h2></body>");
        let out = records(StepRunner::resume(&last, to_y.then, false).collect());
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].field_names().collect::<Vec<_>>(),
            vec!["link", "extra", "more", "deep"]
        );
        assert_eq!(out[0].get("deep"), Some(&FieldValue::from("D")));
    }
}
