use crate::constraints::ConstraintError;
use crate::dtype::DType;
use crate::numeric_tensor::NumericTensorError;
use crate::shape::{Dimension, format_shape};
use crate::trace::ops::{AnyOperation, Operation};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

pub mod ops;

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("Rank inconsistency in {op}: {reason}")]
    RankInconsistent { op: String, reason: String },
    #[error("Shape error in {op}: {reason}")]
    ShapeError { op: String, reason: String },
    #[error("Dtype inconsistency in {op}: {reason}")]
    DtypeInconsistent { op: String, reason: String },
    #[error("Invalid attribute for {op}: {reason}")]
    InvalidAttribute { op: String, reason: String },
    #[error("Unknown tensor {0}")]
    UnknownTensor(TraceTensorId),
    #[error("Unknown operation \"{0}\"")]
    UnknownOperation(String),
    #[error("Operation {op} declares outputs {declared:?}, expected {expected:?}")]
    OutputMismatch {
        op: String,
        declared: Vec<TraceTensorId>,
        expected: Vec<TraceTensorId>,
    },
    #[error("Operation {op} infers output dtype {inferred}, but its constraints resolve to {constrained}")]
    ReturnDtypeMismatch {
        op: String,
        inferred: DType,
        constrained: DType,
    },
    #[error("Duplicate input name \"{0}\"")]
    DuplicateInput(String),
    #[error(transparent)]
    Constraint(#[from] ConstraintError),
    #[error(transparent)]
    NumericTensor(#[from] NumericTensorError),
}

impl TraceError {
    pub(crate) fn rank(op: &str, reason: impl Into<String>) -> Self {
        TraceError::RankInconsistent {
            op: op.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn shape(op: &str, reason: impl Into<String>) -> Self {
        TraceError::ShapeError {
            op: op.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn attribute(op: &str, reason: impl Into<String>) -> Self {
        TraceError::InvalidAttribute {
            op: op.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Hash, Ord, PartialOrd, Eq, PartialEq, Serialize, Deserialize)]
pub struct TraceTensorId {
    inner: usize,
}

impl TraceTensorId {
    pub fn index(&self) -> usize {
        self.inner
    }
}

impl Display for TraceTensorId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "t{}", self.inner)
    }
}

#[derive(Debug, Clone, Copy, Hash, Ord, PartialOrd, Eq, PartialEq, Serialize, Deserialize)]
pub struct TraceOperationId {
    inner: usize,
}

impl TraceOperationId {
    pub fn index(&self) -> usize {
        self.inner
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TensorProducer {
    Input,
    Operation(TraceOperationId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceTensorInfo {
    pub name: Option<String>,
    pub shape: Vec<Dimension>,
    pub dtype: DType,
    pub producer: TensorProducer,
}

impl TraceTensorInfo {
    pub fn rank(&self) -> usize {
        self.shape.len()
    }
}

/// Output rank, dtype and shape an operation would produce if admitted.
#[derive(Debug, Clone, PartialEq)]
pub struct InferredOutput {
    pub shape: Vec<Dimension>,
    pub dtype: DType,
}

/// Arena of trace tensors and operations.
///
/// Operations are stored in admission order. Each operation may only consume tensors
/// that already exist, so that order is a topological order of the DAG.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceGraph {
    tensors: Vec<TraceTensorInfo>,
    operations: Vec<AnyOperation>,
    inputs: Vec<TraceTensorId>,
    outputs: Vec<TraceTensorId>,
}

impl TraceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_input(
        &mut self,
        name: &str,
        shape: Vec<Dimension>,
        dtype: DType,
    ) -> Result<TraceTensorId, TraceError> {
        if self
            .inputs
            .iter()
            .any(|id| self.tensors[id.inner].name.as_deref() == Some(name))
        {
            return Err(TraceError::DuplicateInput(name.to_string()));
        }
        let id = TraceTensorId {
            inner: self.tensors.len(),
        };
        self.tensors.push(TraceTensorInfo {
            name: Some(name.to_string()),
            shape,
            dtype,
            producer: TensorProducer::Input,
        });
        self.inputs.push(id);
        Ok(id)
    }

    /// Ids the next admitted operation must use for its outputs.
    pub fn reserve_outputs(&self, count: usize) -> Vec<TraceTensorId> {
        (0..count)
            .map(|i| TraceTensorId {
                inner: self.tensors.len() + i,
            })
            .collect()
    }

    pub fn get_tensor_info(&self, id: TraceTensorId) -> Result<&TraceTensorInfo, TraceError> {
        self.tensors.get(id.inner).ok_or(TraceError::UnknownTensor(id))
    }

    pub fn num_tensors(&self) -> usize {
        self.tensors.len()
    }

    pub fn get_operation(&self, id: TraceOperationId) -> Option<&AnyOperation> {
        self.operations.get(id.inner)
    }

    pub fn operations(&self) -> &[AnyOperation] {
        &self.operations
    }

    pub fn get_inputs(&self) -> &[TraceTensorId] {
        &self.inputs
    }

    pub fn get_input_names(&self) -> Vec<String> {
        self.inputs
            .iter()
            .map(|id| self.tensors[id.inner].name.clone().unwrap_or_default())
            .collect()
    }

    pub fn get_outputs(&self) -> &[TraceTensorId] {
        &self.outputs
    }

    pub fn set_outputs(&mut self, outputs: Vec<TraceTensorId>) -> Result<(), TraceError> {
        for id in &outputs {
            self.get_tensor_info(*id)?;
        }
        self.outputs = outputs;
        Ok(())
    }

    /// Runs rank, dtype and shape inference for `op` without admitting it.
    pub fn infer_outputs(&self, op: &AnyOperation) -> Result<Vec<InferredOutput>, TraceError> {
        let op_name = op.get_op_type_name();
        let declared = op.get_outputs();
        let expected = self.reserve_outputs(declared.len());
        if declared != expected {
            return Err(TraceError::OutputMismatch {
                op: op_name,
                declared,
                expected,
            });
        }

        let inputs = op
            .get_inputs()
            .into_iter()
            .map(|id| self.get_tensor_info(id))
            .collect::<Result<Vec<_>, _>>()?;
        let ranks = inputs.iter().map(|x| x.rank()).collect::<Vec<_>>();
        let dtypes = inputs.iter().map(|x| x.dtype).collect::<Vec<_>>();
        let shapes = inputs.iter().map(|x| x.shape.clone()).collect::<Vec<_>>();

        let out_ranks = op.infer_rank(&ranks)?;
        let out_dtypes = op.infer_dtypes(&dtypes)?;
        let out_shapes = op.infer_shapes(&shapes)?;
        if out_ranks.len() != declared.len()
            || out_dtypes.len() != declared.len()
            || out_shapes.len() != declared.len()
        {
            return Err(TraceError::rank(
                &op_name,
                format!(
                    "{} outputs declared but inference produced {} ranks, {} dtypes and {} shapes",
                    declared.len(),
                    out_ranks.len(),
                    out_dtypes.len(),
                    out_shapes.len()
                ),
            ));
        }
        for (rank, shape) in out_ranks.iter().zip(out_shapes.iter()) {
            if *rank != shape.len() {
                return Err(TraceError::rank(
                    &op_name,
                    format!("inferred rank {rank} but shape {}", format_shape(shape)),
                ));
            }
        }
        Ok(out_shapes
            .into_iter()
            .zip(out_dtypes)
            .map(|(shape, dtype)| InferredOutput { shape, dtype })
            .collect())
    }

    /// Admits `op`, committing its outputs to the arena.
    pub fn push_op(&mut self, op: AnyOperation) -> Result<TraceOperationId, TraceError> {
        let outputs = self.infer_outputs(&op)?;
        let op_id = TraceOperationId {
            inner: self.operations.len(),
        };
        log::debug!(
            "Admitting {} as op {} with {} output(s)",
            op.get_op_type_name(),
            op_id.inner,
            outputs.len()
        );
        for output in outputs {
            self.tensors.push(TraceTensorInfo {
                name: None,
                shape: output.shape,
                dtype: output.dtype,
                producer: TensorProducer::Operation(op_id),
            });
        }
        self.operations.push(op);
        Ok(op_id)
    }
}

impl Display for TraceGraph {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for id in &self.inputs {
            let info = &self.tensors[id.inner];
            writeln!(
                f,
                "{id} = input {} : {} {}",
                info.name.as_deref().unwrap_or(""),
                info.dtype,
                format_shape(&info.shape)
            )?;
        }
        for op in &self.operations {
            let outputs = op.get_outputs();
            let inputs = op.get_inputs();
            let render = |ids: &[TraceTensorId]| {
                ids.iter().map(|x| x.to_string()).collect::<Vec<_>>().join(", ")
            };
            writeln!(
                f,
                "{} = {}({})",
                render(&outputs),
                op.get_op_type_name(),
                render(&inputs)
            )?;
        }
        let outputs = self.outputs.iter().map(|x| x.to_string()).collect::<Vec<_>>();
        write!(f, "outputs: [{}]", outputs.join(", "))
    }
}
