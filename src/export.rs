use std::collections::HashMap;
use std::fmt::Write as FmtWrite;

use anyhow::{Result, anyhow};

use crate::graph::{EntityType, GraphNode, Point};
use crate::layout::{PositionedScene, sizing_hint};

const EXPORT_MARGIN: f32 = 40.0;

/// Renders a positioned scene to a standalone SVG document. Debugging and
/// one-shot CLI output; the interactive surface draws its own.
pub fn render_svg(scene: &PositionedScene) -> Result<String> {
    if scene.nodes.is_empty() {
        return Ok(empty_svg());
    }

    let mut centers: HashMap<&str, Point> = HashMap::new();
    let mut min_x = f32::MAX;
    let mut max_x = f32::MIN;
    let mut min_y = f32::MAX;
    let mut max_y = f32::MIN;

    for node in &scene.nodes {
        let hint = sizing_hint(node.entity_type);
        let position = node
            .position
            .ok_or_else(|| anyhow!("node '{}' has no position; run layout first", node.id))?;
        centers.insert(
            node.id.as_str(),
            Point {
                x: position.x + hint.width / 2.0,
                y: position.y + hint.height / 2.0,
            },
        );
        min_x = min_x.min(position.x);
        max_x = max_x.max(position.x + hint.width);
        min_y = min_y.min(position.y);
        max_y = max_y.max(position.y + hint.height);
    }

    let width = max_x - min_x + EXPORT_MARGIN * 2.0;
    let height = max_y - min_y + EXPORT_MARGIN * 2.0;
    let shift_x = EXPORT_MARGIN - min_x;
    let shift_y = EXPORT_MARGIN - min_y;

    let mut svg = String::new();
    write!(
        svg,
        r##"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="{:.0}" height="{:.0}" viewBox="0 0 {:.0} {:.0}" font-family="Inter, system-ui, sans-serif">
  <rect width="100%" height="100%" fill="white" />
"##,
        width, height, width, height
    )?;

    for edge in &scene.edges {
        let from = centers
            .get(edge.source.as_str())
            .ok_or_else(|| anyhow!("edge '{}' references unknown node '{}'", edge.id, edge.source))?;
        let to = centers
            .get(edge.target.as_str())
            .ok_or_else(|| anyhow!("edge '{}' references unknown node '{}'", edge.id, edge.target))?;
        let stroke = if edge.is_risky { "#ef4444" } else { "#3b82f6" };

        writeln!(
            svg,
            "  <line x1=\"{:.1}\" y1=\"{:.1}\" x2=\"{:.1}\" y2=\"{:.1}\" stroke=\"{}\" stroke-width=\"2\" />",
            from.x + shift_x,
            from.y + shift_y,
            to.x + shift_x,
            to.y + shift_y,
            stroke
        )?;

        if let Some(label) = &edge.label {
            writeln!(
                svg,
                "  <text x=\"{:.1}\" y=\"{:.1}\" fill=\"#2d3748\" font-size=\"11\" text-anchor=\"middle\">{}</text>",
                (from.x + to.x) / 2.0 + shift_x,
                (from.y + to.y) / 2.0 + shift_y - 6.0,
                escape_xml(label)
            )?;
        }
    }

    for node in &scene.nodes {
        write_node(&mut svg, node, shift_x, shift_y)?;
    }

    svg.push_str("</svg>\n");
    Ok(svg)
}

fn write_node(svg: &mut String, node: &GraphNode, shift_x: f32, shift_y: f32) -> Result<()> {
    let hint = sizing_hint(node.entity_type);
    let position = node
        .position
        .ok_or_else(|| anyhow!("node '{}' has no position; run layout first", node.id))?;
    let x = position.x + shift_x;
    let y = position.y + shift_y;
    let stroke = if node.is_risky { "#ef4444" } else { "#4a5568" };

    match node.entity_type {
        // Endpoints read as terminals, so they get an ellipse.
        EntityType::Endpoint => writeln!(
            svg,
            "  <ellipse cx=\"{:.1}\" cy=\"{:.1}\" rx=\"{:.1}\" ry=\"{:.1}\" fill=\"{}\" stroke=\"{}\" stroke-width=\"2\" />",
            x + hint.width / 2.0,
            y + hint.height / 2.0,
            hint.width / 2.0,
            hint.height / 2.0,
            fill_color(node.entity_type),
            stroke
        )?,
        _ => writeln!(
            svg,
            "  <rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" rx=\"8\" ry=\"8\" fill=\"{}\" stroke=\"{}\" stroke-width=\"2\" />",
            x,
            y,
            hint.width,
            hint.height,
            fill_color(node.entity_type),
            stroke
        )?,
    }

    writeln!(
        svg,
        "  <text x=\"{:.1}\" y=\"{:.1}\" fill=\"#1a202c\" font-size=\"12\" text-anchor=\"middle\" dominant-baseline=\"middle\">{}</text>",
        x + hint.width / 2.0,
        y + hint.height / 2.0,
        escape_xml(&node.label)
    )?;

    Ok(())
}

/// Fill colors follow the map legend: clusters blue, tasks green, external
/// endpoints purple.
fn fill_color(entity_type: EntityType) -> &'static str {
    match entity_type {
        EntityType::Cluster => "#93c5fd",
        EntityType::Task => "#86efac",
        EntityType::Endpoint => "#a855f7",
        EntityType::Service => "#fde68a",
        EntityType::IdentityRole => "#c4f1f9",
    }
}

fn empty_svg() -> String {
    concat!(
        r#"<?xml version="1.0" encoding="UTF-8"?>"#,
        "\n",
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="480" height="180" viewBox="0 0 480 180" font-family="Inter, system-ui, sans-serif">"#,
        "\n",
        r#"  <rect width="100%" height="100%" fill="white" />"#,
        "\n",
        r##"  <text x="240" y="90" fill="#4a5568" font-size="14" text-anchor="middle">No matching nodes</text>"##,
        "\n</svg>\n"
    )
    .to_string()
}

pub fn escape_xml(input: &str) -> String {
    let mut escaped = String::new();
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EntityProperties, GraphEdge};

    fn task(id: &str, label: &str, position: Option<Point>) -> GraphNode {
        GraphNode {
            id: id.to_string(),
            entity_type: EntityType::Task,
            label: label.to_string(),
            is_risky: false,
            is_external: false,
            properties: EntityProperties::Task {
                service: None,
                task_definition: None,
                launch_type: None,
            },
            position,
        }
    }

    #[test]
    fn renders_labels_and_risky_edges() {
        let scene = PositionedScene {
            nodes: vec![
                task("t1", "web", Some(Point { x: 0.0, y: 0.0 })),
                GraphNode {
                    id: "e1".to_string(),
                    entity_type: EntityType::Endpoint,
                    label: "api & co".to_string(),
                    is_risky: false,
                    is_external: true,
                    properties: EntityProperties::Endpoint {
                        hostname: None,
                        port: None,
                        protocol: None,
                    },
                    position: Some(Point { x: 300.0, y: 10.0 }),
                },
            ],
            edges: vec![GraphEdge {
                id: "x1".to_string(),
                source: "t1".to_string(),
                target: "e1".to_string(),
                is_risky: true,
                label: Some("s3:GetObject".to_string()),
                full_action: None,
            }],
        };

        let svg = render_svg(&scene).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("web"));
        assert!(svg.contains("api &amp; co"));
        assert!(svg.contains("#ef4444"), "risky edge should be red");
    }

    #[test]
    fn empty_scene_renders_placeholder() {
        let svg = render_svg(&PositionedScene::default()).unwrap();
        assert!(svg.contains("No matching nodes"));
    }

    #[test]
    fn unpositioned_node_is_an_error() {
        let scene = PositionedScene {
            nodes: vec![task("t1", "web", None)],
            edges: vec![],
        };
        assert!(render_svg(&scene).is_err());
    }
}
