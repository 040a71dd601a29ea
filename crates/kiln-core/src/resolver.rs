//! Turning a package reference into a recipe.

use crate::CoreError;
use kiln_schema::{PackageName, PackageRef, Recipe};
use kiln_store::ArchiveLayout;
use std::io::ErrorKind;

/// A literal recipe's own name, or the bare name itself.
pub fn package_name(package: &PackageRef) -> &PackageName {
    package.package_name()
}

/// Return a literal recipe unchanged, or look a bare name up in the recipe
/// repository under `layout`.
pub fn resolve(layout: &ArchiveLayout, package: &PackageRef) -> Result<Recipe, CoreError> {
    let name = match package {
        PackageRef::Literal(recipe) => return Ok(recipe.clone()),
        PackageRef::Name(name) => name,
    };
    if !PackageName::is_valid(name) {
        return Err(CoreError::RecipeNotFound(name.to_string()));
    }

    let path = layout.recipe_file(name);
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(CoreError::RecipeNotFound(name.to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    let recipe = Recipe::parse(&text)?;
    if recipe.name != *name {
        return Err(CoreError::RecipeMismatch {
            expected: name.to_string(),
            found: recipe.name.to_string(),
        });
    }
    Ok(recipe)
}
