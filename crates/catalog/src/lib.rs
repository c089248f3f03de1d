//! Catalog domain module: sellable/purchasable products and services, grouped in
//! categories (event-sourced, no IO).

pub mod category;
pub mod product;

pub use category::{
    CATEGORY_AGGREGATE, Category, CategoryCommand, CategoryCreated, CategoryEvent, CategoryId,
    CategoryRenamed, CreateCategory, RenameCategory,
};
pub use product::{
    CreateProduct, PRODUCT_AGGREGATE, Product, ProductActivation, ProductCommand, ProductCreated,
    ProductEvent, ProductId, ProductKind, ProductProfile, ProductStatusChanged, ProductUpdated,
    UpdateProduct,
};
