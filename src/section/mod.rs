//! Components D and E: the two kinds of convolution section an
//! impulse response gets partitioned into (spec §4.D, §4.E).

pub mod balanced;
pub mod direct;

pub use balanced::BalancedConvolutionSection;
pub use direct::DirectConvolutionSection;
