mod form_params;
mod timestamps;

pub use form_params::{FormParams, FormParseError};
pub use timestamps::parse_china_standard_time;
