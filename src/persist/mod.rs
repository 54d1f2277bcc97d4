//! Model files.
//!
//! A model is stored as XML: the feature set as one `<feature>` element per
//! top-level feature, then the weight vector.
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <model>
//!   <feature_set>
//!     <feature kind="conjunction" invert="false">
//!       <feature kind="outcome" invert="false" outcome="compatible"/>
//!       <feature kind="word" invert="false" word="box"/>
//!     </feature>
//!   </feature_set>
//!   <llm weights="0.75"/>
//! </model>
//! ```
//!
//! Parameters are plain attributes next to `kind` and `invert`; composite
//! parts nest as child `<feature>` elements.
//!
//! ## Load rules
//!
//! | Problem                              | Result                  |
//! |--------------------------------------|-------------------------|
//! | XML syntax error, missing element    | `Malformed`             |
//! | Element still open at end of file    | `Malformed`             |
//! | Feature kind not in the registry     | `UnknownFeatureKind`    |
//! | Weight count ≠ feature count         | `WeightCountMismatch`   |
//! | NaN or infinite weight               | `NonFiniteWeight`       |
//!
//! Nothing is partially loaded. Saving a model with a non-finite weight is
//! refused.

use std::path::Path;
use std::sync::Arc;

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use tracing::{debug, error, info};

use crate::error::{ModelError, ModelResult};
use crate::features::{FeatureConfig, FeatureRegistry, FeatureSet, ParamValue};
use crate::model::Llm;

const MODEL: &str = "model";
const FEATURE_SET: &str = "feature_set";
const FEATURE: &str = "feature";
const LLM: &str = "llm";

fn emit<W: std::io::Write>(writer: &mut Writer<W>, event: Event<'_>) -> ModelResult<()> {
    writer
        .write_event(event)
        .map_err(|e| ModelError::malformed(format!("cannot write XML: {e}")))
}

fn feature_element(config: &FeatureConfig) -> BytesStart<'static> {
    let mut start = BytesStart::new(FEATURE);
    start.push_attribute(("kind", config.kind.as_str()));
    start.push_attribute(("invert", if config.invert { "true" } else { "false" }));
    for (key, value) in &config.params {
        start.push_attribute((key.as_str(), value.to_string().as_str()));
    }
    start
}

fn write_feature<W: std::io::Write>(writer: &mut Writer<W>, config: &FeatureConfig) -> ModelResult<()> {
    let start = feature_element(config);
    if config.parts.is_empty() {
        return emit(writer, Event::Empty(start));
    }
    emit(writer, Event::Start(start))?;
    for part in &config.parts {
        write_feature(writer, part)?;
    }
    emit(writer, Event::End(BytesEnd::new(FEATURE)))
}

/// Serialize a model. Fails on non-finite weights.
pub fn to_xml(llm: &Llm) -> ModelResult<String> {
    if let Some((index, value)) = llm.first_non_finite() {
        error!(index, value, "refusing to save a model with a non-finite weight");
        return Err(ModelError::NonFiniteWeight { index, value });
    }

    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    emit(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    emit(&mut writer, Event::Start(BytesStart::new(MODEL)))?;

    emit(&mut writer, Event::Start(BytesStart::new(FEATURE_SET)))?;
    for config in llm.feature_set().configs() {
        write_feature(&mut writer, &config)?;
    }
    emit(&mut writer, Event::End(BytesEnd::new(FEATURE_SET)))?;

    let weights = llm.weights()[..llm.num_features()]
        .iter()
        .map(|w| w.to_string())
        .collect::<Vec<_>>()
        .join(",");
    let mut element = BytesStart::new(LLM);
    element.push_attribute(("weights", weights.as_str()));
    emit(&mut writer, Event::Empty(element))?;

    emit(&mut writer, Event::End(BytesEnd::new(MODEL)))?;

    String::from_utf8(writer.into_inner())
        .map_err(|e| ModelError::malformed(format!("non UTF-8 output: {e}")))
}

pub fn save(llm: &Llm, path: &Path) -> ModelResult<()> {
    let xml = to_xml(llm)?;
    std::fs::write(path, xml)?;
    info!(
        path = %path.display(),
        features = llm.num_features(),
        "saved model"
    );
    Ok(())
}

/// Read `<feature kind=.. invert=.. k=v ..>` into a config without parts.
fn parse_feature(start: &BytesStart<'_>) -> ModelResult<FeatureConfig> {
    let mut kind = None;
    let mut config = FeatureConfig::default();

    for attr in start.attributes() {
        let attr = attr.map_err(|e| ModelError::malformed(format!("bad attribute: {e}")))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| ModelError::malformed(format!("bad attribute name: {e}")))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| ModelError::malformed(format!("bad value for {key}: {e}")))?
            .into_owned();

        match key.as_str() {
            "kind" => kind = Some(value),
            "invert" => {
                config.invert = match value.as_str() {
                    "true" | "1" => true,
                    "false" | "0" => false,
                    other => {
                        return Err(ModelError::malformed(format!(
                            "invert must be true or false, got {other:?}"
                        )));
                    }
                }
            }
            _ => {
                config.params.insert(key, ParamValue::Str(value));
            }
        }
    }

    config.kind = kind.ok_or_else(|| ModelError::malformed("feature without a kind"))?;
    Ok(config)
}

fn parse_weights(start: &BytesStart<'_>) -> ModelResult<Vec<f64>> {
    let attr = start
        .try_get_attribute("weights")
        .map_err(|e| ModelError::malformed(format!("bad llm attribute: {e}")))?
        .ok_or_else(|| ModelError::malformed("llm element without weights"))?;
    let text = attr
        .unescape_value()
        .map_err(|e| ModelError::malformed(format!("bad weights: {e}")))?;

    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    text.split(',')
        .enumerate()
        .map(|(index, w)| {
            let value: f64 = w
                .trim()
                .parse()
                .map_err(|_| ModelError::malformed(format!("weight {index} is not a number: {w:?}")))?;
            if !value.is_finite() {
                return Err(ModelError::NonFiniteWeight { index, value });
            }
            Ok(value)
        })
        .collect()
}

/// Feature configurations and weights, before the registry sees them.
fn parse_document(xml: &str) -> ModelResult<(Vec<FeatureConfig>, Vec<f64>)> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut in_model = false;
    let mut in_feature_set = false;
    let mut saw_feature_set = false;
    let mut stack: Vec<FeatureConfig> = Vec::new();
    let mut features: Vec<FeatureConfig> = Vec::new();
    let mut weights: Option<Vec<f64>> = None;

    // Attach a finished feature to its parent, or to the top level.
    fn attach(config: FeatureConfig, stack: &mut [FeatureConfig], features: &mut Vec<FeatureConfig>) {
        match stack.last_mut() {
            Some(parent) => parent.parts.push(config),
            None => features.push(config),
        }
    }

    loop {
        let event = reader.read_event().map_err(|e| {
            ModelError::malformed(format!("at byte {}: {e}", reader.buffer_position()))
        })?;
        match event {
            Event::Start(e) => match e.name().as_ref() {
                b"model" => in_model = true,
                b"feature_set" if in_model => {
                    in_feature_set = true;
                    saw_feature_set = true;
                }
                b"feature" if in_feature_set => stack.push(parse_feature(&e)?),
                b"llm" if in_model && !in_feature_set => weights = Some(parse_weights(&e)?),
                other => {
                    return Err(ModelError::malformed(format!(
                        "unexpected element <{}>",
                        String::from_utf8_lossy(other)
                    )));
                }
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"feature" if in_feature_set => attach(parse_feature(&e)?, &mut stack, &mut features),
                b"feature_set" if in_model => saw_feature_set = true,
                b"llm" if in_model && !in_feature_set => weights = Some(parse_weights(&e)?),
                other => {
                    return Err(ModelError::malformed(format!(
                        "unexpected element <{}/>",
                        String::from_utf8_lossy(other)
                    )));
                }
            },
            Event::End(e) => match e.name().as_ref() {
                b"feature" => {
                    let config = stack
                        .pop()
                        .ok_or_else(|| ModelError::malformed("unbalanced </feature>"))?;
                    attach(config, &mut stack, &mut features);
                }
                b"feature_set" => in_feature_set = false,
                b"model" => in_model = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    // A truncated file must not load as a smaller model.
    if let Some(open) = stack.last() {
        return Err(ModelError::malformed(format!(
            "unclosed <feature kind=\"{}\">",
            open.kind
        )));
    }
    if in_feature_set {
        return Err(ModelError::malformed("unclosed <feature_set>"));
    }
    if in_model {
        return Err(ModelError::malformed("unclosed <model>"));
    }

    if !saw_feature_set {
        return Err(ModelError::malformed("missing <feature_set>"));
    }
    let weights = weights.ok_or_else(|| ModelError::malformed("missing <llm>"))?;
    Ok((features, weights))
}

/// Parse a model, building features through `registry`.
///
/// The weight vector must have exactly one entry per feature.
pub fn from_xml(xml: &str, registry: &FeatureRegistry) -> ModelResult<Llm> {
    let (configs, weights) = parse_document(xml)?;
    let feature_set = FeatureSet::from_configs(&configs, registry)?;
    if weights.len() != feature_set.len() {
        return Err(ModelError::WeightCountMismatch {
            weights: weights.len(),
            features: feature_set.len(),
        });
    }
    debug!(features = feature_set.len(), leaves = feature_set.num_leaves(), "parsed model");
    Llm::with_weights(Arc::new(feature_set), weights)
}

pub fn load(path: &Path, registry: &FeatureRegistry) -> ModelResult<Llm> {
    let xml = std::fs::read_to_string(path)?;
    let llm = from_xml(&xml, registry)?;
    info!(
        path = %path.display(),
        features = llm.num_features(),
        "loaded model"
    );
    Ok(llm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::test_support::{block_world, noun_phrase, object};
    use crate::model::LlmX;
    use crate::types::Outcome;
    use tempfile::TempDir;

    fn configs() -> Vec<FeatureConfig> {
        vec![
            FeatureConfig::new("outcome").with_param("outcome", "compatible"),
            FeatureConfig::new("conjunction")
                .with_part(FeatureConfig::new("outcome").with_param("outcome", "compatible"))
                .with_part(FeatureConfig::new("word").with_param("word", "box"))
                .with_part(
                    FeatureConfig::new("object_type")
                        .with_param("type", "box")
                        .inverted(true),
                ),
            FeatureConfig::new("container_size")
                .with_param("count", 2i64)
                .with_param("cmp", "ge"),
        ]
    }

    fn model(weights: Vec<f64>) -> Llm {
        let set = FeatureSet::from_configs(&configs(), &FeatureRegistry::default()).unwrap();
        Llm::with_weights(Arc::new(set), weights).unwrap()
    }

    #[test]
    fn test_save_load_preserves_model() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.xml");
        let llm = model(vec![0.5, -1.25, 1e-7]);
        save(&llm, &path).unwrap();

        let loaded = load(&path, &FeatureRegistry::default()).unwrap();
        assert_eq!(loaded.weights(), llm.weights());

        let signatures = |l: &Llm| -> Vec<String> {
            l.feature_set().configs().iter().map(|c| c.signature()).collect()
        };
        assert_eq!(signatures(&loaded), signatures(&llm));
        assert_eq!(loaded.feature_set().configs()[1].parts.len(), 3);

        let world = block_world();
        let x = LlmX::new(
            Arc::new(object(&world, "s0")),
            Vec::new(),
            Arc::new(noun_phrase(&[("NN", "box")])),
            Arc::new(world),
        );
        let p = llm.pygx(Outcome::Compatible, &x);
        assert!((loaded.pygx(Outcome::Compatible, &x) - p).abs() < 1e-15);
    }

    #[test]
    fn test_weight_count_must_match() {
        let xml = to_xml(&model(vec![1.0, 2.0, 3.0])).unwrap();
        let short = xml.replace("weights=\"1,2,3\"", "weights=\"1,2\"");
        assert!(matches!(
            from_xml(&short, &FeatureRegistry::default()),
            Err(ModelError::WeightCountMismatch { weights: 2, features: 3 })
        ));
        let long = xml.replace("weights=\"1,2,3\"", "weights=\"1,2,3,4\"");
        assert!(matches!(
            from_xml(&long, &FeatureRegistry::default()),
            Err(ModelError::WeightCountMismatch { weights: 4, features: 3 })
        ));
    }

    #[test]
    fn test_unknown_kind_fails_load() {
        let xml = to_xml(&model(vec![1.0, 2.0, 3.0]))
            .unwrap()
            .replace("kind=\"word\"", "kind=\"telepathy\"");
        assert!(matches!(
            from_xml(&xml, &FeatureRegistry::default()),
            Err(ModelError::UnknownFeatureKind { .. })
        ));
    }

    #[test]
    fn test_non_finite_weights_refused() {
        let mut llm = model(vec![1.0, 2.0, 3.0]);
        llm.set_weights(vec![1.0, f64::NAN, 3.0]).unwrap();
        assert!(matches!(
            to_xml(&llm),
            Err(ModelError::NonFiniteWeight { index: 1, .. })
        ));

        let xml = to_xml(&model(vec![1.0, 2.0, 3.0]))
            .unwrap()
            .replace("weights=\"1,2,3\"", "weights=\"1,inf,3\"");
        assert!(matches!(
            from_xml(&xml, &FeatureRegistry::default()),
            Err(ModelError::NonFiniteWeight { index: 1, .. })
        ));
    }

    #[test]
    fn test_malformed_documents() {
        let registry = FeatureRegistry::default();
        for xml in [
            "<model><feature_set>",
            "<model><llm weights=\"\"/></model>",
            "<model><feature_set/></model>",
            "<model><feature_set><feature invert=\"false\"/></feature_set><llm weights=\"1\"/></model>",
            "<model><feature_set/><llm weights=\"a\"/></model>",
            // cut off inside a composite feature
            concat!(
                "<model><feature_set>",
                "<feature kind=\"word\" invert=\"false\" word=\"box\"/>",
                "<feature kind=\"conjunction\" invert=\"false\">",
                "<feature kind=\"word\" invert=\"false\" word=\"ball\"/>",
                "<llm weights=\"0.5\"/>",
            ),
            // cut off before </model>
            concat!(
                "<model><feature_set>",
                "<feature kind=\"word\" invert=\"false\" word=\"box\"/>",
                "</feature_set><llm weights=\"0.5\"/>",
            ),
            // weights inside the feature set
            concat!(
                "<model><feature_set>",
                "<feature kind=\"word\" invert=\"false\" word=\"box\"/>",
                "<llm weights=\"0.5\"/></feature_set></model>",
            ),
        ] {
            assert!(
                matches!(from_xml(xml, &registry), Err(ModelError::Malformed { .. })),
                "{xml}"
            );
        }

        let empty = from_xml("<model><feature_set/><llm weights=\"\"/></model>", &registry).unwrap();
        assert_eq!(empty.num_features(), 0);
    }
}
