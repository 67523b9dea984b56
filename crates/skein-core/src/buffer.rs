//! Host-owned shared numeric buffer.
//!
//! [`BufferDescriptor`] is the host's exclusive handle on a fixed-length
//! `f64` array. Modules never see the descriptor itself; they receive
//! [`BufferView`]s (reference-counted, no copy of the data) and, during a
//! run, one [`Slot`] per worker ordinal.
//!
//! # Storage
//!
//! Cells are stored as `AtomicU64` bit patterns. A single-cell write from
//! one worker racing a write to the same cell from another worker is
//! therefore a *logical* race (last writer wins), never undefined
//! behaviour. `AtomicU64` has the same in-memory representation as `u64`,
//! so the storage can be exported to foreign code as a plain `double[]`
//! (see `skein-python`).
//!
//! # Shape
//!
//! Every buffer also carries a shape and an [`Order`]. A plain buffer is
//! one-dimensional. [`BufferDescriptor::shaped`] lays the same logical
//! cells out as an n-D array in row-major (C) or column-major (Fortran)
//! order: logical index `i` is always the `i`-th cell in memory order,
//! and [`BufferView::index_of`] maps a multi-index onto it.
//!
//! # Release
//!
//! Dropping (or [`release`](BufferDescriptor::release)-ing) the descriptor
//! marks the storage as released. Views that outlive the descriptor keep
//! the memory alive but every access through them fails with
//! [`BufferError::Released`].

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::BufferError;
use crate::id::WorkerOrdinal;
use crate::identity;

/// Memory layout of the logical cells inside the physical storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    /// Logical cell `i` lives at physical cell `i`.
    Contiguous,
    /// Logical cell `i` lives at physical cell `i * stride`.
    Strided {
        /// Distance between consecutive logical cells, in elements.
        stride: NonZeroUsize,
    },
}

impl Layout {
    /// Element stride (1 for contiguous).
    pub fn stride(self) -> usize {
        match self {
            Self::Contiguous => 1,
            Self::Strided { stride } => stride.get(),
        }
    }
}

/// Traversal order of an n-D shape over the logical cells.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Order {
    /// Last index varies fastest (C order).
    #[default]
    RowMajor,
    /// First index varies fastest (Fortran order).
    ColumnMajor,
}

/// Dimension sizes of a buffer.
pub type Shape = SmallVec<[usize; 4]>;

/// Layout and access flags reported by [`BufferView::flags`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutInfo {
    /// Number of logical cells.
    pub length: usize,
    /// Element stride between logical cells.
    pub stride: usize,
    /// `true` when `stride == 1`: the cells can be indexed as a flat array
    /// without reinterpretation.
    pub contiguous: bool,
    /// Whether writes through this view are permitted.
    pub writable: bool,
    /// Size of one cell in bytes.
    pub itemsize: usize,
    /// Number of dimensions of the shape.
    pub ndim: usize,
}

/// Whether untyped writes from a worker are checked against its ordinal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotOwnership {
    /// Any in-bounds index may be written. Writing a foreign slot is a
    /// contract violation the bridge does not detect.
    Unchecked,
    /// A registered worker writing any index other than its own ordinal
    /// fails with [`BufferError::ForeignSlotWrite`]. Threads that are not
    /// registered workers are not checked.
    Enforced,
}

impl Default for SlotOwnership {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Enforced
        } else {
            Self::Unchecked
        }
    }
}

struct Storage {
    cells: Box<[AtomicU64]>,
    length: usize,
    layout: Layout,
    shape: Shape,
    order: Order,
    writable: AtomicBool,
    released: AtomicBool,
}

impl Storage {
    fn new(values: impl ExactSizeIterator<Item = f64>, length: usize, layout: Layout) -> Self {
        let stride = layout.stride();
        let physical = physical_len(length, stride);
        let mut cells: Vec<AtomicU64> = (0..physical).map(|_| AtomicU64::new(0)).collect();
        for (i, v) in values.enumerate().take(length) {
            cells[i * stride] = AtomicU64::new(v.to_bits());
        }
        Self {
            cells: cells.into_boxed_slice(),
            length,
            layout,
            shape: SmallVec::from_slice(&[length]),
            order: Order::RowMajor,
            writable: AtomicBool::new(true),
            released: AtomicBool::new(false),
        }
    }

    fn check_live(&self) -> Result<(), BufferError> {
        if self.released.load(Ordering::Acquire) {
            Err(BufferError::Released)
        } else {
            Ok(())
        }
    }

    fn cell(&self, index: usize) -> Result<&AtomicU64, BufferError> {
        self.check_live()?;
        if index >= self.length {
            return Err(BufferError::OutOfRange {
                index,
                length: self.length,
            });
        }
        Ok(&self.cells[index * self.layout.stride()])
    }

    fn load(&self, index: usize) -> Result<f64, BufferError> {
        Ok(f64::from_bits(self.cell(index)?.load(Ordering::Acquire)))
    }

    fn store(&self, index: usize, value: f64) {
        // Bounds were checked by the caller via `cell()`.
        self.cells[index * self.layout.stride()].store(value.to_bits(), Ordering::Release);
    }

    fn snapshot(&self) -> Vec<f64> {
        let stride = self.layout.stride();
        (0..self.length)
            .map(|i| f64::from_bits(self.cells[i * stride].load(Ordering::Acquire)))
            .collect()
    }
}

fn physical_len(length: usize, stride: usize) -> usize {
    if length == 0 {
        0
    } else {
        (length - 1) * stride + 1
    }
}

/// The host's exclusive handle on a shared numeric buffer.
///
/// Not `Clone`: there is exactly one owner. Share access with
/// [`view()`](Self::view).
pub struct BufferDescriptor {
    storage: Arc<Storage>,
}

impl BufferDescriptor {
    /// A contiguous, writable buffer of `length` zeros.
    pub fn zeroed(length: usize) -> Self {
        Self::with_layout(length, Layout::Contiguous)
    }

    /// A contiguous, writable buffer holding `values`.
    pub fn from_values(values: Vec<f64>) -> Self {
        let length = values.len();
        Self {
            storage: Arc::new(Storage::new(values.into_iter(), length, Layout::Contiguous)),
        }
    }

    /// A contiguous, writable n-D buffer holding `values` in `order`.
    ///
    /// Fails with [`BufferError::ShapeMismatch`] unless the product of
    /// `shape` equals `values.len()`.
    pub fn shaped(values: Vec<f64>, shape: &[usize], order: Order) -> Result<Self, BufferError> {
        let length = values.len();
        let cells = shape.iter().product::<usize>();
        if shape.is_empty() || cells != length {
            return Err(BufferError::ShapeMismatch { length, cells });
        }
        let mut storage = Storage::new(values.into_iter(), length, Layout::Contiguous);
        storage.shape = SmallVec::from_slice(shape);
        storage.order = order;
        Ok(Self {
            storage: Arc::new(storage),
        })
    }

    /// A zeroed, writable buffer of `length` logical cells in `layout`.
    pub fn with_layout(length: usize, layout: Layout) -> Self {
        Self {
            storage: Arc::new(Storage::new(std::iter::empty(), length, layout)),
        }
    }

    /// Expose the buffer read-only from now on.
    pub fn read_only(self) -> Self {
        self.set_writable(false);
        self
    }

    /// Toggle whether views may write. Affects existing views.
    pub fn set_writable(&self, writable: bool) {
        self.storage.writable.store(writable, Ordering::Release);
    }

    /// A non-owning view. Does not copy the data.
    ///
    /// The view uses the default [`SlotOwnership`] policy for the build
    /// profile; override with [`BufferView::with_ownership`].
    pub fn view(&self) -> BufferView {
        BufferView {
            storage: Arc::clone(&self.storage),
            read_only: false,
            ownership: SlotOwnership::default(),
        }
    }

    /// Number of logical cells.
    pub fn len(&self) -> usize {
        self.storage.length
    }

    /// Whether the buffer has zero cells.
    pub fn is_empty(&self) -> bool {
        self.storage.length == 0
    }

    /// Layout and access flags.
    pub fn flags(&self) -> LayoutInfo {
        self.view().flags()
    }

    /// Bounds-checked read.
    pub fn read(&self, index: usize) -> Result<f64, BufferError> {
        self.storage.load(index)
    }

    /// Host-side write. Ignores the writable flag, which only governs
    /// views; still bounds-checked.
    pub fn set(&self, index: usize, value: f64) -> Result<(), BufferError> {
        self.storage.cell(index)?;
        self.storage.store(index, value);
        Ok(())
    }

    /// Host-side fill of every logical cell.
    pub fn fill(&self, value: f64) {
        for i in 0..self.storage.length {
            self.storage.store(i, value);
        }
    }

    /// Copy of the logical contents, in index order.
    pub fn snapshot(&self) -> Vec<f64> {
        self.storage.snapshot()
    }

    /// Issue one typed slot per ordinal in `[0, min(n, len))`.
    ///
    /// A [`Slot`] can only read and write its own cell, so a worker holding
    /// only its slot cannot touch a foreign index.
    pub fn partition(&self, n: usize) -> Vec<Slot> {
        (0..n.min(self.storage.length))
            .map(|i| Slot {
                storage: Arc::clone(&self.storage),
                ordinal: WorkerOrdinal(i),
            })
            .collect()
    }

    /// Release the buffer, returning its final contents. Outstanding views
    /// fail with [`BufferError::Released`] from here on.
    pub fn release(self) -> Vec<f64> {
        let values = self.storage.snapshot();
        drop(self);
        values
    }
}

impl Drop for BufferDescriptor {
    fn drop(&mut self) {
        self.storage.released.store(true, Ordering::Release);
    }
}

impl fmt::Debug for BufferDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferDescriptor")
            .field("flags", &self.flags())
            .finish()
    }
}

/// A shared, non-owning view of a [`BufferDescriptor`].
///
/// Cloning a view is a reference-count bump; the data is never copied.
#[derive(Clone)]
pub struct BufferView {
    storage: Arc<Storage>,
    read_only: bool,
    ownership: SlotOwnership,
}

impl BufferView {
    /// The same view with writes disabled.
    pub fn read_only(&self) -> Self {
        Self {
            read_only: true,
            ..self.clone()
        }
    }

    /// The same view with the given slot ownership policy.
    pub fn with_ownership(&self, ownership: SlotOwnership) -> Self {
        Self {
            ownership,
            ..self.clone()
        }
    }

    /// Active slot ownership policy.
    pub fn ownership(&self) -> SlotOwnership {
        self.ownership
    }

    /// Number of logical cells.
    pub fn len(&self) -> usize {
        self.storage.length
    }

    /// Whether the buffer has zero cells.
    pub fn is_empty(&self) -> bool {
        self.storage.length == 0
    }

    /// Whether writes through this view are permitted right now.
    pub fn is_writable(&self) -> bool {
        !self.read_only && self.storage.writable.load(Ordering::Acquire)
    }

    /// Whether the host has released the descriptor.
    pub fn is_released(&self) -> bool {
        self.storage.released.load(Ordering::Acquire)
    }

    /// Layout and access flags.
    pub fn flags(&self) -> LayoutInfo {
        let stride = self.storage.layout.stride();
        LayoutInfo {
            length: self.storage.length,
            stride,
            contiguous: stride == 1,
            writable: self.is_writable(),
            itemsize: std::mem::size_of::<f64>(),
            ndim: self.storage.shape.len(),
        }
    }

    /// Dimension sizes. `[len()]` unless built with
    /// [`BufferDescriptor::shaped`].
    pub fn shape(&self) -> &[usize] {
        &self.storage.shape
    }

    /// Traversal order of [`shape`](Self::shape).
    pub fn order(&self) -> Order {
        self.storage.order
    }

    /// Distance in bytes between consecutive entries along each dimension.
    pub fn byte_strides(&self) -> Shape {
        let step = self.storage.layout.stride() * std::mem::size_of::<f64>();
        let shape = &self.storage.shape;
        (0..shape.len())
            .map(|k| {
                let inner: usize = match self.storage.order {
                    Order::RowMajor => shape[k + 1..].iter().product(),
                    Order::ColumnMajor => shape[..k].iter().product(),
                };
                step * inner
            })
            .collect()
    }

    /// Whether the memory is a dense C-ordered array of [`shape`](Self::shape).
    pub fn is_c_contiguous(&self) -> bool {
        self.storage.layout.stride() == 1
            && (self.storage.order == Order::RowMajor || self.spans_one_axis())
    }

    /// Whether the memory is a dense Fortran-ordered array of
    /// [`shape`](Self::shape).
    pub fn is_f_contiguous(&self) -> bool {
        self.storage.layout.stride() == 1
            && (self.storage.order == Order::ColumnMajor || self.spans_one_axis())
    }

    fn spans_one_axis(&self) -> bool {
        self.storage.shape.iter().filter(|&&d| d > 1).count() <= 1
    }

    /// Logical index of the cell at multi-index `coords`.
    ///
    /// # Errors
    ///
    /// - [`BufferError::DimensionMismatch`] if `coords.len()` differs from
    ///   the number of dimensions.
    /// - [`BufferError::OutOfRange`] for the first coordinate outside its
    ///   dimension; `length` is that dimension's size.
    pub fn index_of(&self, coords: &[usize]) -> Result<usize, BufferError> {
        let shape = &self.storage.shape;
        if coords.len() != shape.len() {
            return Err(BufferError::DimensionMismatch {
                expected: shape.len(),
                actual: coords.len(),
            });
        }
        if let Some((&index, &length)) = coords.iter().zip(shape.iter()).find(|(c, d)| c >= d) {
            return Err(BufferError::OutOfRange { index, length });
        }
        let axes: Box<dyn Iterator<Item = usize>> = match self.storage.order {
            Order::RowMajor => Box::new((0..shape.len()).rev()),
            Order::ColumnMajor => Box::new(0..shape.len()),
        };
        let mut index = 0;
        let mut scale = 1;
        for k in axes {
            index += coords[k] * scale;
            scale *= shape[k];
        }
        Ok(index)
    }

    /// Bounds-checked read.
    pub fn read(&self, index: usize) -> Result<f64, BufferError> {
        self.storage.load(index)
    }

    /// Write `value` at `index` in place.
    ///
    /// # Errors
    ///
    /// - [`BufferError::Released`] after the host released the descriptor.
    /// - [`BufferError::OutOfRange`] if `index >= len()`; the buffer is
    ///   left unchanged.
    /// - [`BufferError::NotWritable`] if the view is read-only.
    /// - [`BufferError::ForeignSlotWrite`] if ownership is
    ///   [`Enforced`](SlotOwnership::Enforced) and the calling thread is a
    ///   registered worker whose ordinal differs from `index`.
    pub fn write(&self, index: usize, value: f64) -> Result<(), BufferError> {
        self.storage.cell(index)?;
        if !self.is_writable() {
            return Err(BufferError::NotWritable { index });
        }
        if self.ownership == SlotOwnership::Enforced {
            if let Ok(ordinal) = identity::ordinal() {
                if ordinal.index() != index {
                    return Err(BufferError::ForeignSlotWrite { index, ordinal });
                }
            }
        }
        self.storage.store(index, value);
        Ok(())
    }

    /// Copy of the logical contents, in index order.
    pub fn snapshot(&self) -> Result<Vec<f64>, BufferError> {
        self.storage.check_live()?;
        Ok(self.storage.snapshot())
    }

    /// Number of physical cells backing the view (`(len - 1) * stride + 1`).
    pub fn physical_len(&self) -> usize {
        self.storage.cells.len()
    }

    /// Pointer to the first physical cell, for zero-copy export to foreign
    /// code. Valid for as long as any clone of this view is alive.
    ///
    /// The pointee has the layout of `[f64; physical_len()]`.
    pub fn as_ptr(&self) -> *const AtomicU64 {
        self.storage.cells.as_ptr()
    }

    /// Whether two views alias the same storage.
    pub fn same_storage(&self, other: &BufferView) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }
}

impl fmt::Debug for BufferView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferView")
            .field("flags", &self.flags())
            .field("shape", &self.shape())
            .field("ownership", &self.ownership)
            .field("released", &self.is_released())
            .finish()
    }
}

/// Typed handle to exactly one cell, issued to one worker ordinal.
///
/// Not `Clone`: [`BufferDescriptor::partition`] issues each slot once.
pub struct Slot {
    storage: Arc<Storage>,
    ordinal: WorkerOrdinal,
}

impl Slot {
    /// The ordinal this slot belongs to.
    pub fn ordinal(&self) -> WorkerOrdinal {
        self.ordinal
    }

    /// Read this slot's cell.
    pub fn get(&self) -> Result<f64, BufferError> {
        self.storage.load(self.ordinal.index())
    }

    /// Write this slot's cell.
    ///
    /// Fails only with [`BufferError::Released`] or
    /// [`BufferError::NotWritable`]; the index is always in bounds.
    pub fn set(&mut self, value: f64) -> Result<(), BufferError> {
        let index = self.ordinal.index();
        self.storage.cell(index)?;
        if !self.storage.writable.load(Ordering::Acquire) {
            return Err(BufferError::NotWritable { index });
        }
        self.storage.store(index, value);
        Ok(())
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot").field("ordinal", &self.ordinal).finish()
    }
}
