//! Style composition engine.
//!
//! Fragments are layered left to right and the rendered result is cached in a
//! trie keyed by the ordered sequence of fragment identities. The same
//! combination of fragment instances always resolves to the same handle, which
//! bounds the number of concrete styles created in a document.
//!
//! Keys are identities, not values: two structurally equal fragments built
//! separately are distinct combinations. Callers building fragments per record
//! instead of hoisting them will grow the cache accordingly.

use std::collections::HashMap;

use crate::spec::{SheetError, SpecCellStyle, SpecStyleAttrs, StyleHandle, StyleId};

/// Target-format side of style composition.
pub trait StyleRenderer {
    /// Render a fully layered attribute set into a concrete style handle.
    fn render_style(&mut self, attrs: &SpecStyleAttrs) -> Result<StyleHandle, SheetError>;
}

/// Fold `extra` onto `base`: later non-`None` attributes win, borders are
/// replaced as a whole.
pub fn layer(base: &SpecStyleAttrs, extra: &SpecStyleAttrs) -> SpecStyleAttrs {
    SpecStyleAttrs {
        font_name: extra.font_name.clone().or_else(|| base.font_name.clone()),
        font_size: extra.font_size.or(base.font_size),
        bold: extra.bold.or(base.bold),
        italic: extra.italic.or(base.italic),
        underline: extra.underline.or(base.underline),
        date: extra.date.or(base.date),
        date_pattern: extra
            .date_pattern
            .clone()
            .or_else(|| base.date_pattern.clone()),
        num_format: extra.num_format.clone().or_else(|| base.num_format.clone()),
        font_color: extra.font_color.clone().or_else(|| base.font_color.clone()),
        bg_color: extra.bg_color.clone().or_else(|| base.bg_color.clone()),
        align: extra.align.or(base.align),
        valign: extra.valign.or(base.valign),
        text_wrap: extra.text_wrap.or(base.text_wrap),
        borders: extra.borders.clone().or_else(|| base.borders.clone()),
    }
}

/// Fold any number of fragments, skipping `None`.
pub fn layer_all<'a>(fragments: impl IntoIterator<Item = Option<&'a SpecCellStyle>>) -> SpecStyleAttrs {
    fragments
        .into_iter()
        .flatten()
        .fold(SpecStyleAttrs::default(), |acc, fragment| {
            layer(&acc, fragment.attrs())
        })
}

#[derive(Debug, Default)]
struct StyleNode {
    dict_children: HashMap<StyleId, usize>,
    handle: Option<StyleHandle>,
}

/// Trie of rendered styles, stored as an arena of nodes.
///
/// Node `0` is the root (the empty combination, never rendered).
#[derive(Debug)]
pub struct StyleCache {
    l_nodes: Vec<StyleNode>,
    n_rendered: usize,
}

impl Default for StyleCache {
    fn default() -> Self {
        Self::new()
    }
}

impl StyleCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self {
            l_nodes: vec![StyleNode::default()],
            n_rendered: 0,
        }
    }

    /// Resolve a layered combination into a rendered handle.
    ///
    /// Returns `Ok(None)` when every fragment is `None`. A render failure
    /// leaves no handle at the path.
    pub fn compose<R: StyleRenderer + ?Sized>(
        &mut self,
        renderer: &mut R,
        fragments: &[Option<&SpecCellStyle>],
    ) -> Result<Option<StyleHandle>, SheetError> {
        let l_fragments: Vec<&SpecCellStyle> = fragments.iter().flatten().copied().collect();
        if l_fragments.is_empty() {
            return Ok(None);
        }

        let n_node = self.derive_node_index(l_fragments.iter().map(|fragment| fragment.id()));
        if let Some(handle) = self.l_nodes[n_node].handle {
            return Ok(Some(handle));
        }

        let attrs = layer_all(l_fragments.iter().copied().map(Some));
        let handle = renderer.render_style(&attrs).inspect_err(|err| {
            tracing::error!(target: "xlsx", %err, "style_render_failed");
        })?;
        self.l_nodes[n_node].handle = Some(handle);
        self.n_rendered += 1;
        tracing::debug!(
            target: "xlsx",
            handle = handle.0,
            depth = l_fragments.len(),
            "style_rendered"
        );
        Ok(Some(handle))
    }

    /// Cached handle for an exact identity sequence, without rendering.
    pub fn lookup(&self, ids: &[StyleId]) -> Option<StyleHandle> {
        let mut n_node = 0usize;
        for id in ids {
            n_node = *self.l_nodes[n_node].dict_children.get(id)?;
        }
        self.l_nodes[n_node].handle
    }

    /// Number of trie nodes, root included.
    pub fn node_count(&self) -> usize {
        self.l_nodes.len()
    }

    /// Number of styles rendered through this cache.
    pub fn rendered_count(&self) -> usize {
        self.n_rendered
    }

    fn derive_node_index(&mut self, ids: impl Iterator<Item = StyleId>) -> usize {
        let mut n_node = 0usize;
        for id in ids {
            n_node = match self.l_nodes[n_node].dict_children.get(&id) {
                Some(n_child) => *n_child,
                None => {
                    let n_child = self.l_nodes.len();
                    self.l_nodes.push(StyleNode::default());
                    self.l_nodes[n_node].dict_children.insert(id, n_child);
                    n_child
                }
            };
        }
        n_node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{EnumBorderPosition, EnumHorizontalAlign, SpecBorderSide};

    #[derive(Default)]
    struct RecordingRenderer {
        l_rendered: Vec<SpecStyleAttrs>,
        if_reject: bool,
    }

    impl StyleRenderer for RecordingRenderer {
        fn render_style(&mut self, attrs: &SpecStyleAttrs) -> Result<StyleHandle, SheetError> {
            if self.if_reject {
                return Err(SheetError::StyleRender("rejected".to_string()));
            }
            self.l_rendered.push(attrs.clone());
            Ok(StyleHandle(self.l_rendered.len() - 1))
        }
    }

    fn style(attrs: SpecStyleAttrs) -> SpecCellStyle {
        SpecCellStyle::new(attrs)
    }

    #[test]
    fn test_layer_later_wins_and_borders_replace() {
        let base = SpecStyleAttrs {
            bold: Some(true),
            font_size: Some(10),
            borders: Some(SpecBorderSide::all(1)),
            ..Default::default()
        };
        let extra = SpecStyleAttrs {
            font_size: Some(14),
            borders: Some(vec![SpecBorderSide::new(EnumBorderPosition::Bottom, 2)]),
            ..Default::default()
        };
        let attrs = layer(&base, &extra);
        assert_eq!(attrs.bold, Some(true));
        assert_eq!(attrs.font_size, Some(14));
        assert_eq!(
            attrs.borders,
            Some(vec![SpecBorderSide::new(EnumBorderPosition::Bottom, 2)])
        );
    }

    #[test]
    fn test_compose_reuses_handle_for_same_instances() {
        let mut renderer = RecordingRenderer::default();
        let mut cache = StyleCache::new();
        let s_bold = style(SpecStyleAttrs {
            bold: Some(true),
            ..Default::default()
        });
        let s_center = style(SpecStyleAttrs {
            align: Some(EnumHorizontalAlign::Center),
            ..Default::default()
        });

        let h_first = cache
            .compose(&mut renderer, &[Some(&s_bold), None, Some(&s_center)])
            .unwrap();
        let h_second = cache
            .compose(&mut renderer, &[Some(&s_bold), Some(&s_center)])
            .unwrap();
        assert_eq!(h_first, h_second);
        assert_eq!(renderer.l_rendered.len(), 1);
        assert_eq!(cache.rendered_count(), 1);
        assert_eq!(cache.lookup(&[s_bold.id(), s_center.id()]), h_first);

        let h_swapped = cache
            .compose(&mut renderer, &[Some(&s_center), Some(&s_bold)])
            .unwrap();
        assert_ne!(h_first, h_swapped);
        assert_eq!(renderer.l_rendered.len(), 2);
    }

    #[test]
    fn test_compose_permutation_follows_later_wins() {
        let mut renderer = RecordingRenderer::default();
        let mut cache = StyleCache::new();
        let s_red = style(SpecStyleAttrs {
            bg_color: Some("#FF0000".to_string()),
            ..Default::default()
        });
        let s_blue = style(SpecStyleAttrs {
            bg_color: Some("#0000FF".to_string()),
            ..Default::default()
        });

        cache.compose(&mut renderer, &[Some(&s_red), Some(&s_blue)]).unwrap();
        cache.compose(&mut renderer, &[Some(&s_blue), Some(&s_red)]).unwrap();
        assert_eq!(renderer.l_rendered[0].bg_color.as_deref(), Some("#0000FF"));
        assert_eq!(renderer.l_rendered[1].bg_color.as_deref(), Some("#FF0000"));
    }

    #[test]
    fn test_compose_keys_by_identity_not_value() {
        let mut renderer = RecordingRenderer::default();
        let mut cache = StyleCache::new();
        let attrs = SpecStyleAttrs {
            italic: Some(true),
            ..Default::default()
        };
        let s_a = style(attrs.clone());
        let s_b = style(attrs);

        let h_a = cache.compose(&mut renderer, &[Some(&s_a)]).unwrap();
        let h_b = cache.compose(&mut renderer, &[Some(&s_b)]).unwrap();
        assert_ne!(h_a, h_b);
        assert_eq!(cache.rendered_count(), 2);
    }

    #[test]
    fn test_compose_empty_or_all_none_is_none() {
        let mut renderer = RecordingRenderer::default();
        let mut cache = StyleCache::new();
        assert_eq!(cache.compose(&mut renderer, &[]).unwrap(), None);
        assert_eq!(cache.compose(&mut renderer, &[None, None]).unwrap(), None);
        assert_eq!(cache.node_count(), 1);
    }

    #[test]
    fn test_compose_render_failure_caches_nothing() {
        let mut renderer = RecordingRenderer {
            if_reject: true,
            ..Default::default()
        };
        let mut cache = StyleCache::new();
        let s_bold = style(SpecStyleAttrs {
            bold: Some(true),
            ..Default::default()
        });
        assert!(matches!(
            cache.compose(&mut renderer, &[Some(&s_bold)]),
            Err(SheetError::StyleRender(_))
        ));
        assert_eq!(cache.lookup(&[s_bold.id()]), None);

        renderer.if_reject = false;
        assert_eq!(
            cache.compose(&mut renderer, &[Some(&s_bold)]).unwrap(),
            Some(StyleHandle(0))
        );
    }
}
