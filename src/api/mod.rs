mod coupon;
mod impls;
mod requests;
mod responses;
mod util;

pub use self::coupon::*;
pub use impls::*;
pub use requests::*;
pub use responses::*;
pub use util::*;
