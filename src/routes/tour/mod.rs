mod handler;
mod model;

pub use handler::{
    create_tour,
    delete_tour,
    get_monthly_plan,
    get_tour,
    get_tour_stats,
    list_tours,
    top_five_cheap,
    update_tour,
};
pub use model::{DifficultyStats, MonthPlan};
