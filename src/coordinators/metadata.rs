use super::Coordinator;
use crate::boxes::{BoxHeader, FourCC};
use crate::payload::{Detail, MetadataKey, ParsedPayload};
use std::collections::BTreeMap;

/// Handler and key table of the innermost open `meta`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataEnv {
    pub handler_type: Option<FourCC>,
    /// Keyed by one-based key index.
    pub keys: BTreeMap<u32, MetadataKey>,
}

#[derive(Debug)]
struct MetaContext {
    depth: usize,
    env: MetadataEnv,
}

#[derive(Debug, Default)]
pub struct MetadataCoordinator {
    stack: Vec<MetaContext>,
    /// Depth of the box most recently entered; its payload is next.
    current_depth: usize,
}

impl MetadataCoordinator {
    /// Only direct children of the open `meta` update it; a `hdlr` deeper
    /// in the tree belongs to something else.
    fn direct_child(&mut self, depth: usize) -> Option<&mut MetadataEnv> {
        self.stack
            .last_mut()
            .filter(|c| c.depth + 1 == depth)
            .map(|c| &mut c.env)
    }
}

impl Coordinator for MetadataCoordinator {
    type Env<'a> = MetadataEnv;

    fn will_start_box(&mut self, header: &BoxHeader, depth: usize) {
        self.current_depth = depth;
        if header.is(b"meta") {
            self.stack.push(MetaContext {
                depth,
                env: MetadataEnv::default(),
            });
        }
    }

    fn did_parse_payload(&mut self, header: &BoxHeader, payload: &ParsedPayload) {
        if header.is(b"meta") {
            return;
        }
        let depth = self.current_depth;
        match &payload.detail {
            Some(Detail::HandlerReference(hdlr)) => {
                if let Some(env) = self.direct_child(depth) {
                    env.handler_type = Some(hdlr.handler_type);
                }
            }
            Some(Detail::MetadataKeys(keys)) => {
                if let Some(env) = self.direct_child(depth) {
                    env.keys = keys.keys.iter().map(|k| (k.index, k.clone())).collect();
                }
            }
            _ => {}
        }
    }

    fn did_finish_box(&mut self, header: &BoxHeader) -> Option<ParsedPayload> {
        if header.is(b"meta") {
            self.stack.pop();
        }
        None
    }

    fn environment<'a>(&'a self, header: &BoxHeader) -> Option<MetadataEnv> {
        if !(header.is(b"meta") || header.is(b"keys") || header.is(b"ilst")) {
            return None;
        }
        self.stack.last().map(|c| c.env.clone())
    }
}
