mod payhero;

pub use payhero::*;
