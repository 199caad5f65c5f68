pub mod js_value;
pub mod path_processing;
pub mod text_processing;

pub use js_value::{format_js_number, format_template_value, is_primitive, number_value};
pub use path_processing::{expand_tilde, get_json_path, get_map_path, remove_map_path, set_map_path, split_path};
pub use text_processing::unescape_js;
