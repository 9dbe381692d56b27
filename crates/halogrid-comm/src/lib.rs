//! halogrid-comm: [`Communicator`](halogrid_core::Communicator) back ends.
//!
//! - [`LocalCluster`] / [`LocalComm`]: every rank is a thread in this
//!   process, connected by rendezvous channels. Always available.
//! - `MpiComm`: the MPI world communicator, behind the `mpi` feature.

pub mod local;
#[cfg(feature = "mpi")]
pub mod mpi_comm;

pub use local::{LocalCluster, LocalComm};
#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;
