use heck::ToSnakeCase;

use crate::libs::error::{Error, Result};

/// Builds a table name from a model's declared name.
///
/// Any leading run of non-letters is trimmed, a trailing `Model` is removed,
/// and what remains is converted to `snake_case`:
///
/// ```
/// use modelkit::derive_table_name;
///
/// assert_eq!(derive_table_name("RemoteServerModel").unwrap(), "remote_server");
/// assert_eq!(derive_table_name("$ModelWithPrefixModel").unwrap(), "model_with_prefix");
/// ```
///
/// Fails with [`Error::NamingPrecondition`] when no letters are left.
pub fn derive_table_name(declared_name: &str) -> Result<String> {
    let trimmed = declared_name.trim_start_matches(|c: char| !c.is_ascii_alphabetic());
    let trimmed = trimmed.strip_suffix("Model").unwrap_or(trimmed);

    if !trimmed.chars().any(|c| c.is_ascii_alphabetic()) {
        return Err(Error::NamingPrecondition(declared_name.to_string()));
    }

    Ok(trimmed.to_snake_case())
}

/// The bare identifier of `T`, without module path or generic arguments.
pub fn declared_name_of<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RamseysTestKitchenModel;

    #[test]
    fn derives_expected_names() {
        assert_eq!(derive_table_name("FooModel").unwrap(), "foo");
        assert_eq!(derive_table_name("RemoteServerModel").unwrap(), "remote_server");
        assert_eq!(derive_table_name("PackedBoxesModel").unwrap(), "packed_boxes");
        assert_eq!(
            derive_table_name("$ModelWithPrefixModel").unwrap(),
            "model_with_prefix"
        );
    }

    #[test]
    fn keeps_names_without_model_suffix() {
        assert_eq!(derive_table_name("Invoice").unwrap(), "invoice");
        assert_eq!(derive_table_name("__LineItem").unwrap(), "line_item");
    }

    #[test]
    fn only_strips_a_trailing_model() {
        assert_eq!(derive_table_name("ModelsModel").unwrap(), "models");
        assert_eq!(derive_table_name("ModelRegistry").unwrap(), "model_registry");
    }

    #[test]
    fn rejects_names_without_letters() {
        for name in ["", "$", "123", "Model", "$Model", "_1Model"] {
            let err = derive_table_name(name).unwrap_err();
            assert!(
                matches!(err, Error::NamingPrecondition(ref n) if n == name),
                "{name:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn declared_name_strips_path_and_generics() {
        assert_eq!(
            declared_name_of::<RamseysTestKitchenModel>(),
            "RamseysTestKitchenModel"
        );
        assert_eq!(declared_name_of::<Vec<String>>(), "Vec");
        assert_eq!(
            derive_table_name(declared_name_of::<RamseysTestKitchenModel>()).unwrap(),
            "ramseys_test_kitchen"
        );
    }
}
