//! SeaORM entities for the storefront data model.

pub mod attribute;
pub mod cart;
pub mod cart_item;
pub mod category;
pub mod discount;
pub mod order;
pub mod order_item;
pub mod payment_detail;
pub mod product;
pub mod shipping_address;
pub mod user;
pub mod variant;
pub mod variant_attribute;
pub mod variant_image;

// Re-export entities
pub use attribute::{AttributeKind, Entity as Attribute, Model as AttributeModel};
pub use cart::{Entity as Cart, Model as CartModel};
pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use category::{Entity as Category, Model as CategoryModel};
pub use discount::{Entity as Discount, Model as DiscountModel};
pub use order::{Entity as Order, Model as OrderModel};
pub use order_item::{Entity as OrderItem, Model as OrderItemModel};
pub use payment_detail::{Entity as PaymentDetail, Model as PaymentDetailModel, PaymentMethod};
pub use product::{Entity as Product, Model as ProductModel};
pub use shipping_address::{Entity as ShippingAddress, Model as ShippingAddressModel};
pub use user::{Entity as User, Model as UserModel};
pub use variant::{Entity as Variant, Model as VariantModel};
pub use variant_attribute::Entity as VariantAttribute;
pub use variant_image::{Entity as VariantImage, Model as VariantImageModel};
