//! Generated gRPC/protobuf types for the block store and replicated
//! metadata store services. Kept in its own crate so both `driftsync-block`
//! and `driftsync-meta` can depend on the wire types without depending on
//! each other.

tonic::include_proto!("driftsync.v1");
