mod handler;
mod model;

pub use handler::{
    delete_me,
    delete_user,
    forgot_password,
    get_me,
    get_user,
    list_users,
    login,
    reset_password,
    signup,
    update_me,
    update_password,
    update_user,
};
pub use model::AuthResponse;
