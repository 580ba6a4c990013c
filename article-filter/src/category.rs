use std::collections::{HashMap, HashSet};
use utils_common::Category;

/// 分类树节点，父子关系通过ID互相引用
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategoryNode {
    pub id: u64,
    pub name: String,
    pub slug: String,
    /// 父分类ID，根分类为 `None`
    pub parent: Option<u64>,
    /// 子分类ID，保持接口返回顺序
    pub children: Vec<u64>,
}

/// 分类树 - 节点存放在数组中，加载时一次性建好 ID 和别名索引
#[derive(Clone, Debug, Default)]
pub struct CategoryTree {
    nodes: Vec<CategoryNode>,
    by_id: HashMap<u64, usize>,
    by_slug: HashMap<String, u64>,
    roots: Vec<u64>,
}

impl CategoryTree {
    /// 从接口返回的扁平分类列表构建分类树
    ///
    /// 重复的ID只保留第一个；父分类不存在或指向自身的分类视为根分类。
    pub fn from_categories(categories: impl IntoIterator<Item = Category>) -> Self {
        let mut tree = CategoryTree::default();

        for category in categories {
            if tree.by_id.contains_key(&category.id) {
                continue;
            }
            tree.by_id.insert(category.id, tree.nodes.len());
            if !category.slug.is_empty() {
                tree.by_slug.entry(category.slug.clone()).or_insert(category.id);
            }
            tree.nodes.push(CategoryNode {
                id: category.id,
                name: category.name,
                slug: category.slug,
                parent: category.parent_id,
                children: Vec::new(),
            });
        }

        for index in 0..tree.nodes.len() {
            let id = tree.nodes[index].id;
            let parent_index = tree.nodes[index]
                .parent
                .filter(|parent| *parent != id)
                .and_then(|parent| tree.by_id.get(&parent).copied());

            match parent_index {
                Some(parent_index) => tree.nodes[parent_index].children.push(id),
                None => {
                    tree.nodes[index].parent = None;
                    tree.roots.push(id);
                }
            }
        }

        tree
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn get(&self, id: u64) -> Option<&CategoryNode> {
        self.by_id.get(&id).map(|index| &self.nodes[*index])
    }

    pub fn find_by_slug(&self, slug: &str) -> Option<&CategoryNode> {
        self.by_slug.get(slug).and_then(|id| self.get(*id))
    }

    pub fn parent_of(&self, id: u64) -> Option<u64> {
        self.get(id).and_then(|node| node.parent)
    }

    pub fn roots(&self) -> &[u64] {
        &self.roots
    }

    pub fn children(&self, id: u64) -> &[u64] {
        self.get(id).map(|node| node.children.as_slice()).unwrap_or_default()
    }

    /// 同一父分类下的其他分类；根分类之间互为兄弟。未知分类没有兄弟。
    pub fn siblings(&self, id: u64) -> Vec<u64> {
        let Some(node) = self.get(id) else {
            return Vec::new();
        };
        let group = match node.parent {
            Some(parent) => self.children(parent),
            None => self.roots(),
        };
        group.iter().copied().filter(|other| *other != id).collect()
    }

    /// 从父分类到根分类的祖先链
    pub fn ancestors(&self, id: u64) -> Vec<u64> {
        let mut chain = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut current = self.parent_of(id);
        while let Some(parent) = current {
            // 数据里出现环时停止
            if !seen.insert(parent) {
                break;
            }
            chain.push(parent);
            current = self.parent_of(parent);
        }
        chain
    }
}
