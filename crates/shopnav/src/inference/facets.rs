//! Facet extractor: recover filter groups from a product-listing page.
//!
//! Filter containers are found by class/test-id heuristics. Each needs a
//! heading, which names the group, and yields values from either its
//! checkbox/radio inputs or, when it has none, its query-string links.
//! A container wrapping other containers that carry their own headings is
//! a sidebar of groups, not a group, and is skipped.

use super::links::query_fragment;
use super::{read_attr, read_text};
use crate::error::ScrapeError;
use crate::renderer::{ElementHandle, RenderContext};
use crate::rules::RuleSet;
use crate::types::{FacetGroup, FacetValue};
use tracing::{debug, info};

/// Extracts [`FacetGroup`]s from the current page.
pub struct FacetExtractor<'a> {
    ctx: &'a dyn RenderContext,
    rules: &'a RuleSet,
}

impl<'a> FacetExtractor<'a> {
    pub fn new(ctx: &'a dyn RenderContext, rules: &'a RuleSet) -> Self {
        Self { ctx, rules }
    }

    /// All non-empty groups in container order, wrappers skipped and exact
    /// duplicates collapsed.
    pub async fn extract(&self) -> Result<Vec<FacetGroup>, ScrapeError> {
        let containers = self.ctx.query_all(None, &self.rules.facet_containers).await?;
        debug!("{} filter container candidates", containers.len());

        let mut groups: Vec<FacetGroup> = Vec::new();
        for container in containers {
            if self.wraps_groups(container).await {
                debug!("skipping container {container:?}: wraps other filter groups");
                continue;
            }
            let Some(group) = self.group(container).await else {
                continue;
            };
            if groups.contains(&group) {
                debug!("dropping duplicate facet group {:?}", group.name);
                continue;
            }
            groups.push(group);
        }

        info!("extracted {} facet groups", groups.len());
        Ok(groups)
    }

    /// Whether a candidate container below `container` has its own heading.
    async fn wraps_groups(&self, container: ElementHandle) -> bool {
        let inner = self
            .ctx
            .query_all(Some(container), &self.rules.facet_containers)
            .await
            .unwrap_or_default();
        for candidate in inner {
            if let Ok(Some(_)) = self
                .ctx
                .query_one(Some(candidate), &self.rules.facet_headings)
                .await
            {
                return true;
            }
        }
        false
    }

    async fn group(&self, container: ElementHandle) -> Option<FacetGroup> {
        let heading = match self
            .ctx
            .query_one(Some(container), &self.rules.facet_headings)
            .await
        {
            Ok(Some(heading)) => heading,
            Ok(None) => return None,
            Err(e) => {
                debug!("skipping container {container:?}: {e:#}");
                return None;
            }
        };
        let name = read_text(self.ctx, heading).await?;
        if name.is_empty() || name.chars().count() > self.rules.max_facet_name {
            debug!("skipping facet group {name:?}: name empty or too long");
            return None;
        }

        let inputs = self
            .ctx
            .query_all(Some(container), &self.rules.facet_inputs)
            .await
            .unwrap_or_default();

        let (values, multi) = if inputs.is_empty() {
            (self.link_values(container).await, false)
        } else {
            self.input_values(&inputs).await
        };

        if values.is_empty() {
            debug!("skipping facet group {name:?}: no values");
            return None;
        }
        Some(FacetGroup { name, multi, values })
    }

    /// Values from inputs, and whether any of them is a checkbox.
    async fn input_values(&self, inputs: &[ElementHandle]) -> (Vec<FacetValue>, bool) {
        let mut values = Vec::new();
        let mut multi = false;
        for &input in inputs {
            let kind = read_attr(self.ctx, input, "type").await;
            multi |= kind.is_some_and(|k| k.trim().eq_ignore_ascii_case("checkbox"));

            let label = match self.label_for(input).await {
                Some(label) => label,
                None => read_attr(self.ctx, input, "value").await.unwrap_or_default(),
            };
            let href = read_attr(self.ctx, input, &self.rules.facet_href_attribute)
                .await
                .unwrap_or_default();
            if let Some(value) = FacetValue::new(&label, query_fragment(&href)) {
                values.push(value);
            }
        }
        (values, multi)
    }

    async fn link_values(&self, container: ElementHandle) -> Vec<FacetValue> {
        let links = self
            .ctx
            .query_all(Some(container), &self.rules.facet_links)
            .await
            .unwrap_or_default();

        let mut values = Vec::new();
        for link in links {
            let label = read_text(self.ctx, link).await.unwrap_or_default();
            let href = read_attr(self.ctx, link, "href").await.unwrap_or_default();
            if let Some(value) = FacetValue::new(&label, query_fragment(&href)) {
                values.push(value);
            }
        }
        values
    }

    /// Text of the page's `label[for=<id>]`, if the input has an id and
    /// the label is non-empty.
    async fn label_for(&self, input: ElementHandle) -> Option<String> {
        let id = read_attr(self.ctx, input, "id").await?;
        let selector = format!("label[for=\"{}\"]", css_escape(&id));
        let label = self.ctx.query_one(None, &selector).await.ok()??;
        read_text(self.ctx, label).await.filter(|text| !text.is_empty())
    }
}

fn css_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::fixture::FixtureRenderer;
    use crate::renderer::{Renderer, Viewport, WaitUntil};
    use assert_json_diff::assert_json_eq;
    use serde_json::json;

    async fn extract(html: &str) -> Vec<FacetGroup> {
        let renderer = FixtureRenderer::new().with_page("https://x.com/shirts", html);
        let mut ctx = renderer.new_context(Viewport::new(1280, 900)).await.unwrap();
        ctx.navigate("https://x.com/shirts", WaitUntil::NetworkIdle, 1000)
            .await
            .unwrap();
        let rules = RuleSet::default();
        let groups = FacetExtractor::new(ctx.as_ref(), &rules)
            .extract()
            .await
            .unwrap();
        groups
    }

    #[tokio::test]
    async fn test_checkbox_group() {
        let html = r#"<div class="filter-size">
            <h3>Size</h3>
            <input type="checkbox" id="s" data-href="?size=S"><label for="s">S</label>
            <input type="checkbox" id="m" data-href="?size=M"><label for="m">M</label>
            <input type="checkbox" id="l" data-href="?size=L"><label for="l">L</label>
        </div>"#;
        let groups = extract(html).await;
        assert_json_eq!(
            serde_json::to_value(&groups).unwrap(),
            json!([{
                "name": "Size",
                "multi": true,
                "values": [
                    {"label": "S", "qs": "size=S"},
                    {"label": "M", "qs": "size=M"},
                    {"label": "L", "qs": "size=L"}
                ]
            }])
        );
    }

    #[tokio::test]
    async fn test_radios_are_single_select() {
        let html = r#"<aside>
            <h2>Sort</h2>
            <input type="radio" name="sort" value="Newest" data-href="/shirts?sort=new">
            <input type="radio" name="sort" value="Price" data-href="/shirts?sort=price#top">
        </aside>"#;
        let groups = extract(html).await;
        assert_eq!(groups.len(), 1);
        assert!(!groups[0].multi);
        assert_eq!(groups[0].values[0], FacetValue::new("Newest", "sort=new").unwrap());
        assert_eq!(groups[0].values[1].qs, "sort=price");
    }

    #[tokio::test]
    async fn test_mixed_inputs_with_a_checkbox_are_multi() {
        let html = r#"<div data-testid="filter-colour"><h3>Colour</h3>
            <input type="radio" value="Any" data-href="?colour=any">
            <input type="checkbox" value="Black" data-href="?colour=black">
        </div>"#;
        assert!(extract(html).await[0].multi);
    }

    #[tokio::test]
    async fn test_links_are_single_select() {
        let html = r#"<div class="filters-brand"><span class="title">Brand</span>
            <a href="/shirts?brand=acme">Acme</a>
            <a href="/shirts?brand=zenith&page=1">Zenith</a>
            <a href="/shirts">All</a>
        </div>"#;
        let groups = extract(html).await;
        assert_eq!(groups.len(), 1);
        assert!(!groups[0].multi);
        assert_eq!(
            groups[0].values,
            vec![
                FacetValue::new("Acme", "brand=acme").unwrap(),
                FacetValue::new("Zenith", "brand=zenith&page=1").unwrap(),
            ]
        );
    }

    #[tokio::test]
    async fn test_inputs_take_priority_over_links() {
        let html = r#"<div class="filter"><h3>Fit</h3>
            <input type="checkbox" id="slim" data-href="?fit=slim"><label for="slim">Slim</label>
            <a href="?fit=regular">Regular</a>
        </div>"#;
        let groups = extract(html).await;
        assert_eq!(groups[0].values, vec![FacetValue::new("Slim", "fit=slim").unwrap()]);
    }

    #[tokio::test]
    async fn test_incomplete_values_are_dropped() {
        let html = r#"<div class="filter"><h3>Size</h3>
            <input type="checkbox" id="a" data-href="?size=S"><label for="a">   </label>
            <input type="checkbox" id="b" value="M" data-href="size=M">
            <input type="checkbox" id="c" data-href="?size=L"><label for="c">L</label>
            <input type="checkbox" value="XL">
        </div>"#;
        let groups = extract(html).await;
        assert_eq!(groups[0].values, vec![FacetValue::new("L", "size=L").unwrap()]);
    }

    #[tokio::test]
    async fn test_label_falls_back_to_input_value() {
        let html = r#"<div class="filter"><h3>Size</h3>
            <input type="checkbox" id="nolabel" value="XS" data-href="?size=XS">
        </div>"#;
        let groups = extract(html).await;
        assert_eq!(groups[0].values, vec![FacetValue::new("XS", "size=XS").unwrap()]);
    }

    #[tokio::test]
    async fn test_groups_without_values_or_heading_are_omitted() {
        let html = r#"
            <div class="filter"><h3>Empty</h3><a href="/no-query">Nothing</a></div>
            <div class="filter"><a href="?x=1">No heading</a></div>
            <div class="filter"><h3></h3><a href="?y=1">Blank heading</a></div>
        "#;
        assert!(extract(html).await.is_empty());
    }

    #[tokio::test]
    async fn test_group_name_length_limit() {
        let ok = "n".repeat(40);
        let long = "m".repeat(41);
        let html = format!(
            r#"<div class="filter"><h3>{ok}</h3><a href="?a=1">A</a></div>
               <div class="filter"><h3>{long}</h3><a href="?b=1">B</a></div>"#
        );
        let groups = extract(&html).await;
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, ok);
    }

    #[tokio::test]
    async fn test_nested_containers_do_not_duplicate_groups() {
        let html = r#"<aside>
            <div class="filter-group"><h3>Size</h3>
              <input type="checkbox" id="s" data-href="?size=S"><label for="s">S</label>
            </div>
        </aside>"#;
        let groups = extract(html).await;
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "Size");
    }

    #[tokio::test]
    async fn test_sidebar_of_groups_is_not_merged_into_one() {
        let html = r#"<aside class="filters">
            <div class="filter-size"><h3>Size</h3>
              <input type="checkbox" id="s" data-href="?size=S"><label for="s">S</label>
            </div>
            <div class="filter-colour"><h3>Colour</h3>
              <input type="checkbox" id="red" data-href="?colour=red"><label for="red">Red</label>
            </div>
        </aside>"#;
        let groups = extract(html).await;
        let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["Size", "Colour"]);
        assert_eq!(groups[0].values, vec![FacetValue::new("S", "size=S").unwrap()]);
    }

    #[tokio::test]
    async fn test_container_with_unheaded_inner_block_is_kept() {
        let html = r#"<div class="filter"><h3>Fit</h3>
            <div class="filter-options">
              <input type="checkbox" id="slim" data-href="?fit=slim"><label for="slim">Slim</label>
            </div>
        </div>"#;
        let groups = extract(html).await;
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "Fit");
        assert_eq!(groups[0].values, vec![FacetValue::new("Slim", "fit=slim").unwrap()]);
    }

    #[tokio::test]
    async fn test_no_containers_is_empty_not_an_error() {
        assert!(extract("<main><p>No filters here</p></main>").await.is_empty());
    }

    #[test]
    fn test_css_escape() {
        assert_eq!(css_escape(r#"size"s\m"#), r#"size\"s\\m"#);
    }
}
