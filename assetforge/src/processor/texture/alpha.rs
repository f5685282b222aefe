//! Alpha texture lookup for atlases that split color and alpha.

use crate::bundle::{Container, RecordKind, TextureInfo};

/// Find the alpha texture paired with `color` by name.
///
/// Candidates are sibling textures named `<color>[alpha]` or `<color>a`. An
/// exact dimension match wins; otherwise the largest candidate. Among equally
/// sized candidates the first in container order is taken.
pub fn find_alpha_texture(container: &dyn Container, color: &TextureInfo) -> Option<i64> {
    let bracketed = format!("{}[alpha]", color.name);
    let suffixed = format!("{}a", color.name);

    let candidates = container
        .records()
        .iter()
        .filter(|r| r.kind == RecordKind::Texture && r.id != color.id)
        .filter(|r| r.name == bracketed || r.name == suffixed)
        .filter_map(|r| match container.texture_info(r.id) {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::debug!(record = %r.name, error = %e, "Skipping alpha candidate");
                None
            }
        });

    let mut largest: Option<TextureInfo> = None;
    for info in candidates {
        if info.width == color.width && info.height == color.height {
            return Some(info.id);
        }
        let area = u64::from(info.width) * u64::from(info.height);
        let better = largest
            .as_ref()
            .map_or(true, |l| area > u64::from(l.width) * u64::from(l.height));
        if better {
            largest = Some(info);
        }
    }
    largest.map(|info| info.id)
}
