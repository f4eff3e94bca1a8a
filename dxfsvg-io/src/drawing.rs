//! 解析结果：转换上下文、按图层分组的元素与块定义。

use std::collections::HashMap;

use dxfsvg_core::ConversionContext;
use dxfsvg_core::SvgElement;
use dxfsvg_core::collection::{Collection, EntityDeclaration, Layer};
use serde::Serialize;

/// 转换摘要，用于日志与测试断言。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionSummary {
    pub entities: usize,
    pub skipped: usize,
    pub layers: usize,
    pub blocks: usize,
    pub patterns: usize,
}

#[derive(Debug, Clone)]
pub struct Drawing {
    pub context: ConversionContext,
    layers: Vec<Layer>,
    layer_index: HashMap<String, usize>,
    declarations: Vec<EntityDeclaration>,
    entity_count: usize,
    skipped: usize,
}

impl Drawing {
    pub fn new(context: ConversionContext) -> Self {
        Self {
            context,
            layers: Vec::new(),
            layer_index: HashMap::new(),
            declarations: Vec::new(),
            entity_count: 0,
            skipped: 0,
        }
    }

    /// 按元素所在图层放入对应分组。
    pub fn add_element(&mut self, element: SvgElement) {
        let name = element.layer().unwrap_or("0").to_string();
        let index = match self.layer_index.get(&name) {
            Some(index) => *index,
            None => {
                self.layers.push(Layer::new(name.clone()));
                self.layer_index.insert(name, self.layers.len() - 1);
                self.layers.len() - 1
            }
        };
        self.layers[index].add_element(element);
        self.entity_count += 1;
    }

    pub fn add_declaration(&mut self, declaration: EntityDeclaration) {
        self.declarations.push(declaration);
    }

    pub fn has_declaration(&self, name: &str) -> bool {
        self.declarations.iter().any(|decl| decl.name() == name)
    }

    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    pub fn declarations(&self) -> &[EntityDeclaration] {
        &self.declarations
    }

    /// 非空图层：先按图层表顺序，再按实体中首次出现的顺序。
    pub fn layers(&self) -> Vec<&Layer> {
        let mut ordered: Vec<&Layer> = self
            .context
            .layers
            .iter()
            .filter_map(|style| self.layer_index.get(&style.name))
            .map(|index| &self.layers[*index])
            .collect();
        for layer in &self.layers {
            if self.context.layers.get(layer.name()).is_none() {
                ordered.push(layer);
            }
        }
        ordered.retain(|layer| !layer.is_empty());
        ordered
    }

    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layer_index.get(name).map(|index| &self.layers[*index])
    }

    pub fn entity_count(&self) -> usize {
        self.entity_count
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn summary(&self) -> ConversionSummary {
        ConversionSummary {
            entities: self.entity_count,
            skipped: self.skipped,
            layers: self.layers().len(),
            blocks: self.declarations.len(),
            patterns: self.context.patterns.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dxfsvg_core::element::{Circle, Line};
    use dxfsvg_core::geometry::Point;
    use dxfsvg_core::style::{EntityStyle, LayerStyle};

    fn on_layer(layer: &str) -> SvgElement {
        let mut line = Line::new(Point::default(), Point::from_svg(1.0, 0.0, 0.0));
        line.style = EntityStyle::on_layer(layer);
        line.into()
    }

    #[test]
    fn groups_follow_table_order_then_first_use() {
        let mut context = ConversionContext::default();
        context.layers.insert(LayerStyle::new("B"));
        context.layers.insert(LayerStyle::new("A"));
        let mut drawing = Drawing::new(context);
        drawing.add_element(on_layer("EXTRA"));
        drawing.add_element(on_layer("A"));
        drawing.add_element(on_layer("B"));
        drawing.add_element(Circle::new(Point::default(), 1.0).into());

        let names: Vec<_> = drawing.layers().iter().map(|layer| layer.name()).collect();
        assert_eq!(names, vec!["0", "B", "A", "EXTRA"]);
        assert_eq!(drawing.entity_count(), 4);
        assert_eq!(drawing.layer("A").map(|layer| layer.len()), Some(1));
    }

    #[test]
    fn summary_counts() {
        let mut drawing = Drawing::new(ConversionContext::default());
        drawing.add_element(on_layer("0"));
        drawing.record_skipped();
        drawing.add_declaration(EntityDeclaration::new("DOOR", Default::default()));
        assert!(drawing.has_declaration("DOOR"));
        assert_eq!(
            drawing.summary(),
            ConversionSummary {
                entities: 1,
                skipped: 1,
                layers: 1,
                blocks: 1,
                patterns: 0,
            }
        );
    }
}
