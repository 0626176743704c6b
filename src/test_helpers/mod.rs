// Test Helpers Module - shared collaborators for unit and integration tests
//
// The orchestrator only talks to its backends through the traits in
// `providers`; these mocks implement them with scripted behavior and record
// every call for assertions.

pub mod mocks;

pub use mocks::{
    MockClipSource, MockLocalSynthesizer, MockPrimaryProvider, PrimaryCall,
};
