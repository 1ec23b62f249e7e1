//! Walks the configured span tree and emits one real span per node.
//!
//! Every node starts a span as a child of its parent's context, stays open
//! for its configured duration, runs its children and only then ends. A
//! single child runs in line; siblings run concurrently and are joined
//! before the parent ends.
pub use crate::config::{count_spans, distribute_padding};

use crate::config::SpanSpec;
use futures_util::future::{join_all, BoxFuture, FutureExt};
use opentelemetry::trace::{Status, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue};
use rand::{Rng, RngCore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Tag carrying the node's resource.
pub const RESOURCE_NAME_TAG: &str = "resource.name";
/// Tag carrying the node's span type.
pub const SPAN_TYPE_TAG: &str = "span.type";
/// Tag carrying the random padding.
pub const DUMP_DATA_TAG: &str = "_dump_data";
/// Name of the root created when the tree has several top-level nodes.
pub const SYNTHETIC_ROOT_NAME: &str = "start_root_span";

const SYNTHETIC_ROOT_TYPE: &str = "web";
const SYNTHETIC_ROOT_MILLIS: std::ops::Range<u64> = 60..360;

/// Outcome of one walk over the tree.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Spans that were ended, the synthetic root included.
    pub finished_spans: usize,
}

/// Emits the spans of a configured tree through `tracer`.
#[derive(Debug)]
pub struct Orchestrator<T> {
    tracer: T,
    finished: AtomicUsize,
}

impl<T> Orchestrator<T>
where
    T: Tracer + Send + Sync,
    T::Span: Send + Sync + 'static,
{
    /// Creates an orchestrator emitting through `tracer`.
    pub fn new(tracer: T) -> Self {
        Orchestrator {
            tracer,
            finished: AtomicUsize::new(0),
        }
    }

    /// Emits the whole tree and returns once every span has ended.
    ///
    /// A lone top-level node is the root of the trace. Several top-level
    /// nodes are grouped under a synthetic root of random duration. The root
    /// stays open for half its duration before its children start and for at
    /// least the other half while they run.
    pub async fn run(&self, trace: &[SpanSpec]) -> RunSummary {
        self.finished.store(0, Ordering::SeqCst);
        tracing::info!(name: "orchestrator.start", span_count = count_spans(trace));

        let parent = Context::new();
        let (root, children, duration) = match trace {
            [] => return RunSummary::default(),
            [only] => (self.start(only, &parent), only.children.as_slice(), only.duration),
            siblings => {
                let millis = rand::rng().random_range(SYNTHETIC_ROOT_MILLIS);
                let span = self
                    .tracer
                    .span_builder(SYNTHETIC_ROOT_NAME)
                    .with_attributes([KeyValue::new(SPAN_TYPE_TAG, SYNTHETIC_ROOT_TYPE)])
                    .start_with_context(&self.tracer, &parent);
                (
                    parent.with_span(span),
                    siblings,
                    Duration::from_millis(millis),
                )
            }
        };

        let half = duration / 2;
        tokio::time::sleep(half).await;
        tokio::join!(
            tokio::time::sleep(duration - half),
            join_all(children.iter().map(|child| self.visit(child, &root))),
        );
        match trace {
            [only] => self.finish(&root, only),
            _ => {
                root.span().end();
                self.finished.fetch_add(1, Ordering::SeqCst);
            }
        }

        let summary = RunSummary {
            finished_spans: self.finished.load(Ordering::SeqCst),
        };
        tracing::info!(name: "orchestrator.finished", finished_spans = summary.finished_spans);
        summary
    }

    fn visit<'a>(&'a self, node: &'a SpanSpec, parent: &'a Context) -> BoxFuture<'a, ()> {
        async move {
            let cx = self.start(node, parent);
            tokio::time::sleep(node.duration).await;
            self.dispatch(&node.children, &cx).await;
            self.finish(&cx, node);
        }
        .boxed()
    }

    async fn dispatch(&self, children: &[SpanSpec], parent: &Context) {
        match children {
            [] => {}
            [only] => self.visit(only, parent).await,
            siblings => {
                join_all(siblings.iter().map(|child| self.visit(child, parent))).await;
            }
        }
    }

    fn start(&self, node: &SpanSpec, parent: &Context) -> Context {
        let attributes = [
            KeyValue::new(RESOURCE_NAME_TAG, node.resource.clone()),
            KeyValue::new(SPAN_TYPE_TAG, node.span_type.clone()),
        ]
        .into_iter()
        .chain(
            node.tags
                .iter()
                .map(|tag| KeyValue::new(tag.key.clone(), tag.value.to_string())),
        );
        let span = self
            .tracer
            .span_builder(node.operation.clone())
            .with_attributes(attributes)
            .start_with_context(&self.tracer, parent);
        parent.with_span(span)
    }

    fn finish(&self, cx: &Context, node: &SpanSpec) {
        let span = cx.span();
        if node.padding_bytes > 0 {
            span.set_attribute(KeyValue::new(
                DUMP_DATA_TAG,
                random_hex(node.padding_bytes),
            ));
        }
        if let Some(message) = &node.error {
            span.set_status(Status::error(message.clone()));
        }
        span.end();
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

/// `len` random bytes, hex encoded.
fn random_hex(len: u64) -> String {
    let mut buf = vec![0u8; usize::try_from(len).unwrap_or(usize::MAX)];
    rand::rng().fill_bytes(&mut buf);
    const_hex::encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Tag, TagValue};
    use opentelemetry::trace::{SpanId, TracerProvider};
    use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider, SpanData};
    use std::collections::HashSet;

    fn node(operation: &str, millis: u64, children: Vec<SpanSpec>) -> SpanSpec {
        SpanSpec {
            operation: operation.to_string(),
            resource: format!("/{operation}"),
            span_type: "web".to_string(),
            duration: Duration::from_millis(millis),
            children,
            ..Default::default()
        }
    }

    async fn emit(trace: &[SpanSpec]) -> (RunSummary, Vec<SpanData>) {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        let summary = Orchestrator::new(provider.tracer("test")).run(trace).await;
        (summary, exporter.get_finished_spans().unwrap())
    }

    fn by_name<'a>(spans: &'a [SpanData], name: &str) -> &'a SpanData {
        spans.iter().find(|s| s.name == name).unwrap()
    }

    fn attr(span: &SpanData, key: &str) -> Option<String> {
        span.attributes
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| kv.value.to_string())
    }

    #[tokio::test]
    async fn single_root_tree() {
        let trace = vec![node(
            "root",
            4,
            vec![node("a", 2, vec![node("a1", 1, vec![])]), node("b", 1, vec![])],
        )];
        let (summary, spans) = emit(&trace).await;

        assert_eq!(summary.finished_spans, count_spans(&trace));
        assert_eq!(spans.len(), 4);
        let trace_ids: HashSet<_> = spans.iter().map(|s| s.span_context.trace_id()).collect();
        assert_eq!(trace_ids.len(), 1);

        let root = by_name(&spans, "root");
        assert_eq!(root.parent_span_id, SpanId::INVALID);
        assert_eq!(
            by_name(&spans, "a").parent_span_id,
            root.span_context.span_id()
        );
        assert_eq!(
            by_name(&spans, "a1").parent_span_id,
            by_name(&spans, "a").span_context.span_id()
        );
        assert_eq!(attr(root, RESOURCE_NAME_TAG).as_deref(), Some("/root"));
        assert_eq!(attr(root, SPAN_TYPE_TAG).as_deref(), Some("web"));
        // the root ends last
        assert_eq!(spans.last().unwrap().name, "root");
    }

    #[tokio::test]
    async fn several_top_level_nodes_get_a_synthetic_root() {
        let trace = vec![node("a", 1, vec![]), node("b", 1, vec![node("c", 1, vec![])])];
        let (summary, spans) = emit(&trace).await;

        assert_eq!(summary.finished_spans, count_spans(&trace) + 1);
        let root = by_name(&spans, SYNTHETIC_ROOT_NAME);
        assert_eq!(attr(root, SPAN_TYPE_TAG).as_deref(), Some("web"));
        assert_eq!(root.parent_span_id, SpanId::INVALID);
        let elapsed = root.end_time.duration_since(root.start_time).unwrap();
        assert!(elapsed >= Duration::from_millis(60));
        for name in ["a", "b"] {
            assert_eq!(
                by_name(&spans, name).parent_span_id,
                root.span_context.span_id()
            );
        }
    }

    #[tokio::test]
    async fn siblings_run_concurrently() {
        let children = (0..5)
            .map(|i| node(&format!("sibling-{i}"), 50, vec![]))
            .collect();
        let (_, spans) = emit(&[node("root", 0, children)]).await;

        let siblings: Vec<_> = spans
            .iter()
            .filter(|s| s.name.starts_with("sibling-"))
            .collect();
        assert_eq!(siblings.len(), 5);
        let last_start = siblings.iter().map(|s| s.start_time).max().unwrap();
        let first_end = siblings.iter().map(|s| s.end_time).min().unwrap();
        assert!(last_start < first_end);
    }

    #[tokio::test]
    async fn single_child_runs_after_parent_duration() {
        let trace = vec![node("root", 0, vec![node("parent", 20, vec![node("child", 5, vec![])])])];
        let (_, spans) = emit(&trace).await;

        let parent = by_name(&spans, "parent");
        let child = by_name(&spans, "child");
        assert!(child.start_time >= parent.start_time + Duration::from_millis(20));
        assert!(parent.end_time >= child.end_time);
    }

    #[tokio::test]
    async fn root_waits_half_before_children() {
        let trace = vec![node("root", 40, vec![node("child", 0, vec![])])];
        let (_, spans) = emit(&trace).await;

        let root = by_name(&spans, "root");
        let child = by_name(&spans, "child");
        assert!(child.start_time >= root.start_time + Duration::from_millis(20));
        assert!(root.end_time >= root.start_time + Duration::from_millis(40));
    }

    #[tokio::test]
    async fn errors_tags_and_padding() {
        let mut failing = node("failing", 1, vec![]);
        failing.error = Some("card declined".to_string());
        failing.padding_bytes = 16;
        failing.tags = vec![
            Tag {
                key: "http.status_code".to_string(),
                value: TagValue::Number(402.into()),
            },
            Tag {
                key: "retry".to_string(),
                value: TagValue::Bool(false),
            },
            Tag {
                key: "region".to_string(),
                value: TagValue::String("eu".to_string()),
            },
        ];
        let trace = vec![node("root", 0, vec![failing, node("ok", 1, vec![])])];
        let (_, spans) = emit(&trace).await;

        let failing = by_name(&spans, "failing");
        assert_eq!(failing.status, Status::error("card declined"));
        assert_eq!(attr(failing, "http.status_code").as_deref(), Some("402"));
        assert_eq!(attr(failing, "retry").as_deref(), Some("false"));
        assert_eq!(attr(failing, "region").as_deref(), Some("eu"));
        let dump = attr(failing, DUMP_DATA_TAG).unwrap();
        assert_eq!(dump.len(), 32);
        assert!(dump.chars().all(|c| c.is_ascii_hexdigit()));

        let ok = by_name(&spans, "ok");
        assert_eq!(ok.status, Status::Unset);
        assert_eq!(attr(ok, DUMP_DATA_TAG), None);
    }

    #[tokio::test]
    async fn empty_tree_emits_nothing() {
        let (summary, spans) = emit(&[]).await;
        assert_eq!(summary.finished_spans, 0);
        assert!(spans.is_empty());
    }

    #[test]
    fn random_hex_length() {
        assert_eq!(random_hex(0), "");
        assert_eq!(random_hex(100).len(), 200);
    }
}
