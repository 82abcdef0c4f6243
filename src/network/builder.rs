use crate::activation::activation::ActivationFunction;
use crate::error::{Error, Result};
use crate::layers::conv::conv_output_extent;
use crate::layers::pool::pool_output_extent;
use crate::layers::{ConvStage, DenseStage, FlattenStage, PoolStage, ReshapeStage, Stage};
use crate::math::tensor::element_count;
use crate::network::network::Network;
use crate::network::spec::{LayerKind, LayerSpec};

const DEFAULT_STRIDE: usize = 1;
const DEFAULT_PADDING: usize = 0;

/// Lowers a declared layer list into a runnable network over `input_shape`.
///
/// Layers are connected in order, with `Flatten` and `Reshape` stages
/// inserted wherever the shape flowing between two layers does not have the
/// rank the next layer expects; that includes the boundary between the input
/// and the first layer. A flat vector feeding a spatial layer is
/// reinterpreted as a square (or cubic) single-channel block, which only
/// works when the width has an exact integer root.
///
/// Every network ends in a flatten plus a softmax projection onto
/// `num_classes`, regardless of what the declared list does.
pub fn build_network(
    layers: &[LayerSpec],
    input_shape: &[usize],
    num_classes: usize,
) -> Result<Network> {
    if layers.is_empty() {
        return Err(Error::Configuration(
            "architecture has no layers".to_string(),
        ));
    }
    if input_shape.is_empty() || element_count(input_shape) == 0 {
        return Err(Error::Configuration(format!(
            "input shape {:?} has no elements",
            input_shape
        )));
    }
    if num_classes == 0 {
        return Err(Error::Configuration(
            "cannot build a classifier over zero classes".to_string(),
        ));
    }

    let mut stages: Vec<Stage> = Vec::new();
    let mut shape: Vec<usize> = input_shape.to_vec();

    for (position, layer) in layers.iter().enumerate() {
        let ordinal = position + 1;
        if layer.size.is_empty() {
            return Err(Error::Configuration(format!(
                "layer {} ({}): size list is empty",
                ordinal, layer.kind
            )));
        }
        shape = reconcile_rank(&mut stages, shape, layer, ordinal)?;

        match layer.kind {
            LayerKind::Dense => {
                let units = layer.size[0];
                if units == 0 {
                    return Err(Error::Configuration(format!(
                        "layer {} (Dense): size must be at least 1",
                        ordinal
                    )));
                }
                let stage = DenseStage::new(shape[0], units, ActivationFunction::ReLU);
                shape = vec![units];
                stages.push(Stage::Dense(stage));
            }
            LayerKind::Convolution => {
                let params = layer.config.as_ref().ok_or_else(|| {
                    Error::Configuration(format!(
                        "layer {} (Convolution): requires config.filters and config.activation",
                        ordinal
                    ))
                })?;
                let filters = params.filters.filter(|&f| f > 0).ok_or_else(|| {
                    Error::Configuration(format!(
                        "layer {} (Convolution): filters must be at least 1",
                        ordinal
                    ))
                })?;
                let activation_name = params.activation.as_deref().ok_or_else(|| {
                    Error::Configuration(format!(
                        "layer {} (Convolution): no activation declared",
                        ordinal
                    ))
                })?;
                let activation = ActivationFunction::parse(activation_name)?;
                if activation == ActivationFunction::Softmax {
                    return Err(Error::Configuration(format!(
                        "layer {} (Convolution): softmax is reserved for the classification stage",
                        ordinal
                    )));
                }
                let stride = params.stride.unwrap_or(DEFAULT_STRIDE);
                if stride == 0 {
                    return Err(Error::Configuration(format!(
                        "layer {} (Convolution): stride must be at least 1",
                        ordinal
                    )));
                }
                let padding = params.padding.unwrap_or(DEFAULT_PADDING);

                for (axis, (&extent, &k)) in shape.iter().zip(&layer.size).enumerate() {
                    if conv_output_extent(extent, k, stride, padding).is_none() {
                        return Err(Error::IncompatibleLayerSpec(format!(
                            "layer {} (Convolution): kernel {} exceeds input extent {} on axis {}",
                            ordinal, k, extent, axis
                        )));
                    }
                }
                let stage = ConvStage::new(&shape, &layer.size, filters, stride, padding, activation);
                shape = stage.output_shape.clone();
                stages.push(Stage::Conv(stage));
            }
            LayerKind::Pooling => {
                for (axis, (&extent, &w)) in shape.iter().zip(&layer.size).enumerate() {
                    if pool_output_extent(extent, w).is_none() {
                        return Err(Error::IncompatibleLayerSpec(format!(
                            "layer {} (Max pooling): window {} exceeds input extent {} on axis {}",
                            ordinal, w, extent, axis
                        )));
                    }
                }
                let stage = PoolStage::new(&shape, &layer.size);
                shape = stage.output_shape.clone();
                stages.push(Stage::Pool(stage));
            }
        }
    }

    // Classification head: everything flattens into a softmax projection
    // sized to the dataset's class count.
    if shape.len() > 1 {
        let flatten = FlattenStage::new(&shape);
        shape = vec![flatten.output_len()];
        stages.push(Stage::Flatten(flatten));
    }
    stages.push(Stage::Dense(DenseStage::new(
        shape[0],
        num_classes,
        ActivationFunction::Softmax,
    )));

    if log::log_enabled!(log::Level::Debug) {
        for (i, stage) in stages.iter().enumerate() {
            log::debug!("stage {}: {}", i, stage.describe());
        }
    }

    Ok(Network {
        input_shape: input_shape.to_vec(),
        num_classes,
        stages,
        metadata: None,
    })
}

/// Rank the shape feeding this layer must have: flat for dense, spatial
/// extents plus a channel axis for convolution and pooling.
fn expected_input_rank(layer: &LayerSpec) -> usize {
    match layer.kind {
        LayerKind::Dense => 1,
        LayerKind::Convolution | LayerKind::Pooling => layer.size.len() + 1,
    }
}

fn reconcile_rank(
    stages: &mut Vec<Stage>,
    mut shape: Vec<usize>,
    layer: &LayerSpec,
    ordinal: usize,
) -> Result<Vec<usize>> {
    let wanted = expected_input_rank(layer);
    if shape.len() == wanted {
        return Ok(shape);
    }

    if shape.len() != 1 {
        let flatten = FlattenStage::new(&shape);
        shape = vec![flatten.output_len()];
        stages.push(Stage::Flatten(flatten));
    }
    if shape.len() == wanted {
        return Ok(shape);
    }

    // Flat vector meeting a spatial layer: reinterpret it as a block with
    // equal sides and one channel.
    let spatial = (wanted - 1) as u32;
    let width = shape[0];
    let side = integer_root(width, spatial).ok_or_else(|| {
        let block = match spatial {
            2 => "square",
            _ => "cube",
        };
        Error::IncompatibleLayerSpec(format!(
            "layer {} ({}): incoming width {} is not a perfect {}, cannot reshape to a {}-dimensional block",
            ordinal, layer.kind, width, block, spatial
        ))
    })?;

    let mut block = vec![side; spatial as usize];
    block.push(1);
    stages.push(Stage::Reshape(ReshapeStage::new(&shape, &block)));
    Ok(block)
}

/// Exact integer `degree`-th root, if one exists.
fn integer_root(value: usize, degree: u32) -> Option<usize> {
    let guess = (value as f64).powf(1.0 / degree as f64).round() as usize;
    // Float rounding can land one off on either side.
    (guess.saturating_sub(1)..=guess + 1).find(|&c| c.pow(degree) == value)
}
