//! The `loom` module provides the foundations a tensor program runs on.
//!
//! ## Key Components
//! 1. **Numerical System**:
//!    - Element types (`DataType`) and their byte sizes.
//!    - Scalar traits (`Scalar`, `Float`) for typed views over raw buffers.
//!
//! 2. **Tensors**:
//!    - `Shape`: ordered dimension sizes.
//!    - `Tensor`: a reference-counted handle over a typed, shaped byte buffer, possibly empty.
//!
//! 3. **Workspace**:
//!    - A named store owning the tensors of one execution context.
//!    - Reuses a buffer whenever a name is asked for with the type and shape it already has.
//!
//! 4. **Dispatch**:
//!    - Operation descriptors (`OpDesc`) naming their inputs and outputs.
//!    - The `Operation` capability and a `Registry` mapping tags to handlers.

pub mod num;
pub mod ops;
pub mod shape;
pub mod tensor;
pub mod workspace;
