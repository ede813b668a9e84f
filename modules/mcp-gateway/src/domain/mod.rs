pub mod error;
pub mod operation;
pub mod registry;
pub mod session;

pub use error::SessionError;
pub use operation::{
    OperationDescriptor, OperationError, OperationSet, ProtectedOperation, Rejection,
    RejectionKind,
};
pub use registry::SessionRegistry;
pub use session::{CloseReason, ServerEvent, Session, SessionState, StreamAttachment, TransportHandle};
