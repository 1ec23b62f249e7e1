pub(crate) mod zipkin {
    pub mod proto3 {
        include!("proto/zipkin.proto3.rs");
    }
}
