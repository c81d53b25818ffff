use crate::backend::Device;
use crate::dtype::DType;
use crate::numeric_tensor::{NumericElement, NumericTensor, NumericTensorError};
use std::cell::{OnceCell, RefCell};
use std::fmt::{Debug, Display, Formatter};

#[derive(Debug, thiserror::Error)]
pub enum TensorError {
    #[error("Deferred computation failed: {0}")]
    Deferred(anyhow::Error),
    #[error("Deferred computation already failed on an earlier materialization")]
    PreviouslyFailed,
    #[error(transparent)]
    NumericTensor(#[from] NumericTensorError),
}

type Deferred = Box<dyn FnOnce() -> anyhow::Result<NumericTensor>>;

/// User-facing tensor handle.
///
/// Either holds a concrete value or a deferred computation that is forced, at most
/// once, by [`Tensor::materialize`].
pub struct Tensor {
    value: OnceCell<NumericTensor>,
    deferred: RefCell<Option<Deferred>>,
    device: Device,
}

impl Tensor {
    pub fn new(value: NumericTensor) -> Self {
        Self::on_device(value, Device::default())
    }

    pub fn on_device(value: NumericTensor, device: Device) -> Self {
        Self {
            value: OnceCell::from(value),
            deferred: RefCell::new(None),
            device,
        }
    }

    pub fn from_vec_shape<T: NumericElement>(v: Vec<T>, shape: Vec<usize>) -> Result<Self, TensorError> {
        Ok(Self::new(NumericTensor::from_vec_shape(v, shape)?))
    }

    pub fn deferred<F>(f: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<NumericTensor> + 'static,
    {
        Self {
            value: OnceCell::new(),
            deferred: RefCell::new(Some(Box::new(f))),
            device: Device::default(),
        }
    }

    pub fn is_materialized(&self) -> bool {
        self.value.get().is_some()
    }

    pub fn materialize(&self) -> Result<&NumericTensor, TensorError> {
        if let Some(value) = self.value.get() {
            return Ok(value);
        }
        let f = self
            .deferred
            .borrow_mut()
            .take()
            .ok_or(TensorError::PreviouslyFailed)?;
        log::debug!("Materializing deferred tensor");
        let value = f().map_err(TensorError::Deferred)?;
        Ok(self.value.get_or_init(|| value))
    }

    pub fn dtype(&self) -> Result<DType, TensorError> {
        Ok(self.materialize()?.dtype())
    }

    pub fn shape(&self) -> Result<Vec<usize>, TensorError> {
        Ok(self.materialize()?.shape())
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn to_vec<T: NumericElement>(&self) -> Result<Vec<T>, TensorError> {
        Ok(self.materialize()?.to_vec()?)
    }
}

impl From<NumericTensor> for Tensor {
    fn from(value: NumericTensor) -> Self {
        Tensor::new(value)
    }
}

impl Debug for Tensor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("value", &self.value.get())
            .field("device", &self.device)
            .finish()
    }
}

impl Display for Tensor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.value.get() {
            Some(value) => write!(
                f,
                "tensor({value}, dtype={}, loc={}, shape={:?})",
                value.dtype(),
                self.device,
                value.shape()
            ),
            None => write!(f, "tensor(<deferred>, loc={})", self.device),
        }
    }
}
