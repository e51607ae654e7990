//! Template tracking, keyed by (observation domain, template id).
//!
//! Templates are installed on template-set receipt, replaced wholesale on
//! retransmission, and retained for the ingester's lifetime. Options
//! templates share the store (so retransmissions replace them too) but are
//! flagged and their data sets skipped by rendering.

use std::collections::HashMap;

/// One field descriptor within a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub enterprise: Option<u32>,
    pub id: u16,
    /// Declared wire length; `0xFFFF` means variable-length (IPFIX)
    pub length: u16,
}

/// An installed (options-)template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub id: u16,
    pub fields: Vec<FieldSpec>,
    pub options: bool,
}

impl Template {
    /// Minimum bytes one data record of this template occupies
    pub fn min_record_len(&self) -> usize {
        self.fields
            .iter()
            .map(|f| if f.length == 0xFFFF { 1 } else { f.length as usize })
            .sum()
    }
}

/// Per-ingester template memory
#[derive(Debug, Default)]
pub struct TemplateStore {
    templates: HashMap<(u32, u16), Template>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace; returns true when an existing template was
    /// replaced (a retransmission)
    pub fn insert(&mut self, obs_domain: u32, template: Template) -> bool {
        self.templates
            .insert((obs_domain, template.id), template)
            .is_some()
    }

    pub fn get(&self, obs_domain: u32, template_id: u16) -> Option<&Template> {
        self.templates.get(&(obs_domain, template_id))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
