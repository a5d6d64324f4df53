use crate::types::{GeometryFamily, GeometryKind, LayerStatus, LayerType, StyleConfig};

/// Default style for a new layer, looked up by (layer type, geometry family)
/// with the status color overriding the base stroke and fill colors.
pub fn default_style(
    layer_type: LayerType,
    kind: GeometryKind,
    status: LayerStatus,
) -> StyleConfig {
    let mut style = StyleConfig::default();

    match (layer_type, kind.family()) {
        (LayerType::Deposit, GeometryFamily::Point) => {
            style.icon_url = Some("gold-icon.svg".to_string());
            style.color = "#FFD700".to_string();
        }
        (LayerType::Deposit, GeometryFamily::Polygon) => {
            style.fill_color = "#FFD700".to_string();
            style.fill_opacity = 0.3;
            style.color = "#F59500".to_string();
        }
        (LayerType::Infrastructure, GeometryFamily::Line) => {
            style.color = "#8B4513".to_string();
            style.weight = 3.0;
        }
        (LayerType::Infrastructure, GeometryFamily::Polygon) => {
            style.fill_color = "#8B4513".to_string();
            style.fill_opacity = 0.2;
        }
        (LayerType::Zone, GeometryFamily::Polygon) => {
            style.fill_color = "#22c55e".to_string();
            style.fill_opacity = 0.3;
            style.color = "#16a34a".to_string();
        }
        _ => {}
    }

    // Status always overrides the base color.
    let status_color = match status {
        LayerStatus::Active => "#22c55e",
        LayerStatus::InDevelopment => "#eab308",
        LayerStatus::Exploratory => "#3b82f6",
        LayerStatus::Closed => "#6b7280",
    };
    style.color = status_color.to_string();
    style.fill_color = status_color.to_string();

    style
}
